//! In-memory remote store for testing and single-process scenarios.
//!
//! Records live in a key-ordered map; every mutation is also appended to a
//! change log. Subscriptions read the log from their own position, the same
//! way independent subscribers read a shared queue.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use super::{
    ChangeEvent, ChangeKind, Payload, PayloadFormat, RangeSnapshot, RemoteStore, Subscription,
};
use crate::error::RemoteError;
use crate::query::{PageLimit, RangeQuery};
use crate::record::{Document, Record};
use crate::value::{FieldValue, Fields};

fn poisoned(what: &str) -> RemoteError {
    RemoteError::Storage(format!("{} lock poisoned", what))
}

/// In-memory store. Clone-friendly via Arc; clones share data and log.
///
/// Meant for tests and single-process demos: the change log is append-only
/// and is never compacted, so it grows with every write.
///
/// ## Example
///
/// ```
/// use streambase_rust::{Fields, FieldValue, InMemoryRemoteStore, QueryBuilder, RemoteStore};
///
/// let store = InMemoryRemoteStore::new();
/// let mut fields = Fields::new();
/// fields.insert("text".into(), FieldValue::from("hi"));
/// store.set("m1", fields).unwrap();
///
/// let query = QueryBuilder::new().limit(10).build().unwrap();
/// let snapshot = store.query(&query.range_query()).unwrap();
/// assert_eq!(snapshot.records.len(), 1);
/// assert!(!snapshot.has_more);
/// ```
#[derive(Clone)]
pub struct InMemoryRemoteStore {
    data: Arc<RwLock<BTreeMap<String, Fields>>>,
    log: Arc<RwLock<Vec<ChangeEvent>>>,
    connected: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    next_push: Arc<AtomicU64>,
    format: PayloadFormat,
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemoteStore {
    /// Create an empty store emitting JSON payloads.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            log: Arc::new(RwLock::new(Vec::new())),
            connected: Arc::new(AtomicBool::new(true)),
            generation: Arc::new(AtomicU64::new(0)),
            next_push: Arc::new(AtomicU64::new(0)),
            format: PayloadFormat::default(),
        }
    }

    /// Choose how change payloads are encoded.
    pub fn with_payload_format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }

    /// Write a record, emitting `Added` or `Changed`.
    pub fn set(&self, key: impl Into<String>, fields: Fields) -> Result<(), RemoteError> {
        let key = key.into();
        let payload = Payload::encode(self.format, &fields)
            .map_err(|e| RemoteError::Storage(e.to_string()))?;

        let mut data = self.data.write().map_err(|_| poisoned("data"))?;
        let kind = match data.insert(key.clone(), fields) {
            Some(_) => ChangeKind::Changed,
            None => ChangeKind::Added,
        };
        self.append(ChangeEvent {
            kind,
            key,
            payload: Some(payload),
        })
    }

    /// Write a record under a generated key. Generated keys sort in creation order.
    pub fn push(&self, fields: Fields) -> Result<String, RemoteError> {
        let seq = self.next_push.fetch_add(1, Ordering::SeqCst);
        let key = format!("-{:016x}", seq);
        self.set(key.clone(), fields)?;
        Ok(key)
    }

    /// Delete a record. Returns true if it existed.
    pub fn remove(&self, key: &str) -> Result<bool, RemoteError> {
        let mut data = self.data.write().map_err(|_| poisoned("data"))?;
        if data.remove(key).is_none() {
            return Ok(false);
        }
        self.append(ChangeEvent::removed(key))?;
        Ok(true)
    }

    pub fn get(&self, key: &str) -> Result<Option<Fields>, RemoteError> {
        let data = self.data.read().map_err(|_| poisoned("data"))?;
        Ok(data.get(key).cloned())
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<usize, RemoteError> {
        Ok(self.data.read().map_err(|_| poisoned("data"))?.len())
    }

    pub fn is_empty(&self) -> Result<bool, RemoteError> {
        Ok(self.len()? == 0)
    }

    /// Append a raw event to the change log without touching the data, e.g.
    /// to simulate a redelivery or a corrupt event.
    pub fn inject(&self, event: ChangeEvent) -> Result<(), RemoteError> {
        self.append(event)
    }

    /// Drop the connection. Live subscriptions fail on their next poll.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Restore the connection. Subscriptions from before the outage stay dead.
    pub fn reconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
    }

    fn append(&self, event: ChangeEvent) -> Result<(), RemoteError> {
        self.log.write().map_err(|_| poisoned("log"))?.push(event);
        Ok(())
    }

    fn ensure_connected(&self) -> Result<(), RemoteError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Disconnected("store is offline".into()))
        }
    }
}

impl RemoteStore for InMemoryRemoteStore {
    fn query(&self, range: &RangeQuery) -> Result<RangeSnapshot, RemoteError> {
        self.ensure_connected()?;
        let data = self.data.read().map_err(|_| poisoned("data"))?;

        let mut matching: Vec<_> = data
            .iter()
            .map(|(key, fields)| Document::with_fields(key.clone(), fields.clone()))
            .filter_map(|doc| {
                let value = range.ordering_value(&doc)?;
                range.contains_value(&value).then_some((value, doc))
            })
            .collect();

        // Native order: ordering value, then key.
        matching.sort_by(|(av, a), (bv, b)| {
            FieldValue::native_cmp(av, bv).then_with(|| a.key().cmp(&b.key()))
        });

        let total = matching.len();
        let records: Vec<Document> = match range.limit {
            Some(PageLimit::First(n)) => matching.into_iter().take(n).map(|(_, d)| d).collect(),
            Some(PageLimit::Last(n)) => matching
                .into_iter()
                .skip(total.saturating_sub(n))
                .map(|(_, d)| d)
                .collect(),
            None => matching.into_iter().map(|(_, d)| d).collect(),
        };
        let has_more = records.len() < total;

        Ok(RangeSnapshot { records, has_more })
    }

    fn subscribe(&self, _range: &RangeQuery) -> Result<Box<dyn Subscription>, RemoteError> {
        self.ensure_connected()?;
        let position = self.log.read().map_err(|_| poisoned("log"))?.len();
        Ok(Box::new(InMemorySubscription {
            log: Arc::clone(&self.log),
            position: Mutex::new(position),
            connected: Arc::clone(&self.connected),
            generation: Arc::clone(&self.generation),
            subscribed_at: self.generation.load(Ordering::SeqCst),
        }))
    }
}

/// Subscription over an [`InMemoryRemoteStore`] change log.
///
/// Delivers every change committed after it was created; filtering against
/// the query range is left to the consumer.
pub struct InMemorySubscription {
    log: Arc<RwLock<Vec<ChangeEvent>>>,
    position: Mutex<usize>,
    connected: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    subscribed_at: u64,
}

impl InMemorySubscription {
    fn check_alive(&self) -> Result<(), RemoteError> {
        let alive = self.connected.load(Ordering::SeqCst)
            && self.generation.load(Ordering::SeqCst) == self.subscribed_at;
        if alive {
            Ok(())
        } else {
            Err(RemoteError::Disconnected("subscription lost".into()))
        }
    }
}

impl Subscription for InMemorySubscription {
    fn poll(&self, timeout_ms: u64) -> Result<Option<ChangeEvent>, RemoteError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            self.check_alive()?;
            {
                let log = self.log.read().map_err(|_| poisoned("log"))?;
                let mut pos = self.position.lock().map_err(|_| poisoned("position"))?;

                if *pos < log.len() {
                    let event = log[*pos].clone();
                    *pos += 1;
                    return Ok(Some(event));
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryBuilder;

    fn scored(score: i64) -> Fields {
        let mut fields = Fields::new();
        fields.insert("score".into(), FieldValue::from(score));
        fields
    }

    fn keys(snapshot: &RangeSnapshot) -> Vec<&str> {
        snapshot.records.iter().filter_map(|r| r.key()).collect()
    }

    #[test]
    fn set_then_query_by_key() {
        let store = InMemoryRemoteStore::new();
        for key in ["c", "a", "b"] {
            store.set(key, Fields::new()).unwrap();
        }
        let query = QueryBuilder::new().build().unwrap();
        let snapshot = store.query(&query.range_query()).unwrap();
        assert_eq!(keys(&snapshot), vec!["a", "b", "c"]);
    }

    #[test]
    fn limit_requests_one_lookahead_and_reports_more() {
        let store = InMemoryRemoteStore::new();
        for key in ["a", "b", "c", "d", "e"] {
            store.set(key, Fields::new()).unwrap();
        }

        let asc = QueryBuilder::new().limit(2).build().unwrap();
        let snapshot = store.query(&asc.range_query()).unwrap();
        assert_eq!(keys(&snapshot), vec!["a", "b", "c"]);
        assert!(snapshot.has_more);

        let desc = QueryBuilder::new().descending().limit(2).build().unwrap();
        let snapshot = store.query(&desc.range_query()).unwrap();
        assert_eq!(keys(&snapshot), vec!["c", "d", "e"]);
        assert!(snapshot.has_more);
    }

    #[test]
    fn child_bounds_are_inclusive() {
        let store = InMemoryRemoteStore::new();
        for (key, score) in [("a", 1), ("b", 5), ("c", 10), ("d", 15)] {
            store.set(key, scored(score)).unwrap();
        }
        let query = QueryBuilder::new()
            .ordered_by_child("score")
            .starting_at(5)
            .ending_at(10)
            .build()
            .unwrap();
        let snapshot = store.query(&query.range_query()).unwrap();
        assert_eq!(keys(&snapshot), vec!["b", "c"]);
        assert!(!snapshot.has_more);
    }

    #[test]
    fn subscription_sees_changes_after_subscribe() {
        let store = InMemoryRemoteStore::new();
        store.set("old", Fields::new()).unwrap();

        let range = QueryBuilder::new().build().unwrap().range_query();
        let sub = store.subscribe(&range).unwrap();

        store.set("new", scored(1)).unwrap();
        store.set("new", scored(2)).unwrap();
        store.remove("new").unwrap();
        assert!(!store.remove("never").unwrap());

        let kinds: Vec<_> = (0..3)
            .map(|_| sub.poll(10).unwrap().unwrap().kind)
            .collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Added, ChangeKind::Changed, ChangeKind::Removed]
        );
        assert!(sub.poll(5).unwrap().is_none());
    }

    #[test]
    fn push_keys_sort_in_creation_order() {
        let store = InMemoryRemoteStore::new();
        let first = store.push(Fields::new()).unwrap();
        let second = store.push(Fields::new()).unwrap();
        assert!(first < second);
        assert_eq!(store.len().unwrap(), 2);
        assert!(!store.is_empty().unwrap());
    }

    #[test]
    fn poisoned_data_lock_is_a_storage_error() {
        let store = InMemoryRemoteStore::new();
        let data = Arc::clone(&store.data);
        let _ = std::thread::spawn(move || {
            let _guard = data.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        assert!(matches!(store.len(), Err(RemoteError::Storage(_))));
        assert!(matches!(store.is_empty(), Err(RemoteError::Storage(_))));
    }

    #[test]
    fn nan_values_sort_without_panicking() {
        let store = InMemoryRemoteStore::new().with_payload_format(PayloadFormat::Fields);
        for i in 0..120 {
            let score = if i % 3 == 0 { f64::NAN } else { f64::from(i % 7) };
            let mut fields = Fields::new();
            fields.insert("score".into(), FieldValue::Number(score));
            store.set(format!("k{:03}", i), fields).unwrap();
        }

        let query = QueryBuilder::new().ordered_by_child("score").build().unwrap();
        let snapshot = store.query(&query.range_query()).unwrap();
        assert_eq!(snapshot.records.len(), 120);

        let nan_from = snapshot
            .records
            .iter()
            .position(|r| r.get("score").and_then(FieldValue::as_f64).map_or(false, f64::is_nan))
            .unwrap();
        assert_eq!(nan_from, 80);
        assert!(snapshot.records[nan_from..]
            .iter()
            .all(|r| r.get("score").and_then(FieldValue::as_f64).map_or(false, f64::is_nan)));
    }

    #[test]
    fn disconnect_fails_subscriptions_until_resubscribed() {
        let store = InMemoryRemoteStore::new();
        let range = QueryBuilder::new().build().unwrap().range_query();
        let sub = store.subscribe(&range).unwrap();

        store.disconnect();
        assert!(matches!(sub.poll(1), Err(RemoteError::Disconnected(_))));
        assert!(store.query(&range).is_err());

        store.reconnect();
        assert!(sub.poll(1).is_err());
        let fresh = store.subscribe(&range).unwrap();
        assert!(fresh.poll(1).unwrap().is_none());
    }
}
