//! The ordered window buffer and the batch handle that mutates it.

use std::collections::HashMap;

use log::{debug, warn};

use crate::query::{Comparator, Query};
use crate::record::Record;

/// Sorted, key-unique sequence of records, bounded to a capacity.
///
/// A window that tracks its tail mirrors the head of a larger remote range.
/// While `partial` is set, records past the last item exist but are unknown,
/// so a record that sorts after the last item cannot be placed and is dropped
/// until the range is fetched again.
#[derive(Debug, Clone)]
pub(crate) struct Window<R> {
    items: Vec<R>,
    capacity: Option<usize>,
    overflowed: bool,
    track_tail: bool,
    partial: bool,
}

impl<R: Record> Window<R> {
    pub(crate) fn new(capacity: Option<usize>, track_tail: bool) -> Self {
        Self {
            items: Vec::new(),
            capacity,
            overflowed: false,
            track_tail,
            partial: false,
        }
    }

    /// A scratch copy of this window for the next batch.
    pub(crate) fn scratch(&self) -> Self {
        Self {
            items: self.items.clone(),
            capacity: self.capacity,
            overflowed: false,
            track_tail: self.track_tail,
            partial: self.partial,
        }
    }

    /// The remote range holds records past the last item.
    pub(crate) fn is_partial(&self) -> bool {
        self.partial
    }

    pub(crate) fn items(&self) -> &[R] {
        &self.items
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    /// Position of `key`. Binary search under key ordering, linear otherwise.
    pub(crate) fn position(&self, comparator: &Comparator, key: &str) -> Option<usize> {
        if comparator.is_key_ordered() {
            let pos = self
                .items
                .partition_point(|r| comparator.cmp_key(r, key) == std::cmp::Ordering::Less);
            self.items
                .get(pos)
                .filter(|r| r.key() == Some(key))
                .map(|_| pos)
        } else {
            self.items.iter().position(|r| r.key() == Some(key))
        }
    }

    /// Insert or replace a record at its sorted position.
    pub(crate) fn upsert(&mut self, comparator: &Comparator, record: R) {
        if let Some(key) = record.key() {
            if let Some(i) = self.position(comparator, key) {
                self.items.remove(i);
            }
        }
        let pos = self
            .items
            .partition_point(|r| comparator.before(r, &record));
        if self.partial && pos == self.items.len() {
            debug!("record sorts past the known tail, dropped until refill");
            return;
        }
        self.items.insert(pos, record);
        self.enforce_capacity();
    }

    pub(crate) fn remove_key(&mut self, comparator: &Comparator, key: &str) -> bool {
        match self.position(comparator, key) {
            Some(i) => {
                self.items.remove(i);
                true
            }
            None => false,
        }
    }

    /// Replace the whole content. Later duplicates of a key win.
    pub(crate) fn reset(&mut self, comparator: &Comparator, records: Vec<R>) {
        let mut last: HashMap<String, usize> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            if let Some(key) = record.key() {
                last.insert(key.to_string(), i);
            }
        }

        // Insertion by binary search: cross-type ties make the comparator
        // non-transitive, which `sort_by` may reject with a panic.
        let mut items: Vec<R> = Vec::with_capacity(records.len());
        for (i, record) in records.into_iter().enumerate() {
            if record.key().and_then(|k| last.get(k)) != Some(&i) {
                continue;
            }
            let pos = items.partition_point(|r| comparator.before(r, &record));
            items.insert(pos, record);
        }

        self.items = items;
        self.partial = false;
        self.enforce_capacity();
    }

    fn enforce_capacity(&mut self) {
        if let Some(capacity) = self.capacity {
            if self.items.len() > capacity {
                self.items.truncate(capacity);
                self.overflowed = true;
                if self.track_tail {
                    self.partial = true;
                }
            }
        }
    }

    /// Close the batch and report whether more records exist than `limit`.
    ///
    /// Tail-tracking windows keep their lookahead record; others are trimmed
    /// to `limit`.
    pub(crate) fn finalize(&mut self, limit: Option<usize>) -> bool {
        let truncated = match limit {
            Some(limit) => self.overflowed || self.items.len() > limit,
            None => false,
        };
        self.overflowed = false;
        if self.track_tail {
            self.partial = self.partial || truncated;
            return self.partial;
        }
        if let Some(limit) = limit {
            self.items.truncate(limit);
        }
        truncated
    }
}

/// Mutable view of the scratch window for one batch.
///
/// Records without a key are rejected, and records outside the query bounds
/// are treated as leaving the window.
pub struct Batch<'a, R> {
    window: &'a mut Window<R>,
    comparator: &'a Comparator,
    query: &'a Query,
}

impl<'a, R: Record> Batch<'a, R> {
    pub(crate) fn new(window: &'a mut Window<R>, comparator: &'a Comparator, query: &'a Query) -> Self {
        Self {
            window,
            comparator,
            query,
        }
    }

    /// Merge a record at its sorted position. An existing record with the
    /// same key is replaced.
    pub fn add(&mut self, record: R) {
        let key = match record.key() {
            Some(key) => key.to_string(),
            None => {
                warn!("ignoring record without a key");
                return;
            }
        };
        if !self.query.in_bounds(&record) {
            debug!("record {} lies outside the query bounds", key);
            self.window.remove_key(self.comparator, &key);
            return;
        }
        self.window.upsert(self.comparator, record);
    }

    pub fn add_all<I: IntoIterator<Item = R>>(&mut self, records: I) {
        for record in records {
            self.add(record);
        }
    }

    /// Replace a record by key, moving it if its sort position changed.
    pub fn update(&mut self, record: R) {
        self.add(record);
    }

    /// Remove a record by key. Absent keys are ignored.
    pub fn remove(&mut self, record: &R) -> bool {
        match record.key() {
            Some(key) => self.remove_key(key),
            None => false,
        }
    }

    pub fn remove_key(&mut self, key: &str) -> bool {
        self.window.remove_key(self.comparator, key)
    }

    /// Replace the whole window content.
    pub fn reset<I: IntoIterator<Item = R>>(&mut self, records: I) {
        let records: Vec<R> = records
            .into_iter()
            .filter(|r| match r.key() {
                Some(_) => self.query.in_bounds(r),
                None => {
                    warn!("ignoring record without a key");
                    false
                }
            })
            .collect();
        self.window.reset(self.comparator, records);
    }

    pub fn find(&self, key: &str) -> Option<usize> {
        self.window.position(self.comparator, key)
    }

    pub fn items(&self) -> &[R] {
        self.window.items()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{OrderBy, QueryBuilder};
    use crate::record::Document;

    fn keys<R: Record>(items: &[R]) -> Vec<&str> {
        items.iter().filter_map(|r| r.key()).collect()
    }

    #[test]
    fn upsert_keeps_order_and_uniqueness() {
        let comp = Comparator::new(OrderBy::Child("n".into()), true);
        let mut window = Window::new(None, false);
        window.upsert(&comp, Document::new("a").with_field("n", 3));
        window.upsert(&comp, Document::new("b").with_field("n", 1));
        window.upsert(&comp, Document::new("c").with_field("n", 2));
        assert_eq!(keys(window.items()), vec!["b", "c", "a"]);

        window.upsert(&comp, Document::new("a").with_field("n", 0));
        assert_eq!(keys(window.items()), vec!["a", "b", "c"]);
    }

    #[test]
    fn key_ordered_lookup_uses_sorted_position() {
        for ascending in [true, false] {
            let comp = Comparator::new(OrderBy::Key, ascending);
            let mut window = Window::new(None, false);
            for key in ["d", "a", "c", "b"] {
                window.upsert(&comp, Document::new(key));
            }
            for key in ["a", "b", "c", "d"] {
                let pos = window.position(&comp, key).unwrap();
                assert_eq!(window.items()[pos].key(), Some(key));
            }
            assert!(window.position(&comp, "zz").is_none());
        }
    }

    #[test]
    fn capacity_drops_last_and_flags_overflow() {
        let comp = Comparator::new(OrderBy::Key, true);
        let mut window = Window::new(Some(3), false);
        for key in ["z", "a", "m", "b"] {
            window.upsert(&comp, Document::new(key));
        }
        assert_eq!(keys(window.items()), vec!["a", "b", "m"]);
        assert!(window.finalize(Some(2)));
        assert_eq!(keys(window.items()), vec!["a", "b"]);
    }

    #[test]
    fn finalize_can_keep_lookahead() {
        let comp = Comparator::new(OrderBy::Key, true);
        let mut window = Window::new(Some(3), true);
        window.reset(&comp, vec![Document::new("b"), Document::new("a"), Document::new("c")]);
        assert!(window.finalize(Some(2)));
        assert_eq!(window.len(), 3);
        assert!(window.is_partial());
    }

    #[test]
    fn reset_keeps_last_duplicate() {
        let comp = Comparator::new(OrderBy::Key, true);
        let mut window = Window::new(None, false);
        window.reset(
            &comp,
            vec![
                Document::new("a").with_field("v", 1),
                Document::new("b"),
                Document::new("a").with_field("v", 2),
            ],
        );
        assert_eq!(keys(window.items()), vec!["a", "b"]);
        assert_eq!(window.items()[0].get("v"), Some(&crate::FieldValue::from(2)));
    }

    #[test]
    fn batch_rejects_unkeyed_and_out_of_bounds_records() {
        let query = QueryBuilder::new().starting_at("b").build().unwrap();
        let comp = query.comparator();
        let mut window = Window::new(None, false);
        let mut batch = Batch::new(&mut window, &comp, &query);

        batch.add(Document::unkeyed());
        batch.add(Document::new("a"));
        batch.add(Document::new("c"));
        assert_eq!(keys(batch.items()), vec!["c"]);
        assert!(!batch.remove_key("a"));
        assert_eq!(batch.find("c"), Some(0));
    }
}
