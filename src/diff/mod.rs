//! Edit scripts - minimal ordered operations turning one window into another.
//!
//! Operations are meant to be replayed in order against the previous window:
//!
//! ```text
//! Remove { index }        remove at index
//! Insert { index, .. }    insert at index
//! Move { from, to }       remove at `from`, then insert at `to`
//! Update { index, .. }    replace the record at index
//! ```

mod lis;

use std::collections::{HashMap, HashSet};

use crate::error::StreamError;
use crate::record::Record;

/// One edit against a window.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOp<R> {
    Insert { index: usize, record: R },
    Remove { index: usize },
    Move { from: usize, to: usize },
    Update { index: usize, record: R },
}

/// Per-kind operation counts of an [`EditScript`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EditCounts {
    pub inserted: usize,
    pub removed: usize,
    pub moved: usize,
    pub updated: usize,
}

/// Ordered edit operations produced for one closed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EditScript<R> {
    ops: Vec<EditOp<R>>,
}

impl<R> Default for EditScript<R> {
    fn default() -> Self {
        Self { ops: Vec::new() }
    }
}

impl<R> EditScript<R> {
    pub fn new(ops: Vec<EditOp<R>>) -> Self {
        Self { ops }
    }

    pub fn ops(&self) -> &[EditOp<R>] {
        &self.ops
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EditOp<R>> {
        self.ops.iter()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<EditOp<R>> {
        self.ops
    }

    pub fn counts(&self) -> EditCounts {
        let mut counts = EditCounts::default();
        for op in &self.ops {
            match op {
                EditOp::Insert { .. } => counts.inserted += 1,
                EditOp::Remove { .. } => counts.removed += 1,
                EditOp::Move { .. } => counts.moved += 1,
                EditOp::Update { .. } => counts.updated += 1,
            }
        }
        counts
    }
}

impl<R: Clone> EditScript<R> {
    /// Replay the script against `target` in order.
    ///
    /// On an out-of-range index the target is left as it was after the
    /// preceding operations and the offending operation is reported.
    pub fn apply(&self, target: &mut Vec<R>) -> Result<(), StreamError> {
        for (op_index, op) in self.ops.iter().enumerate() {
            let len = target.len();
            let invalid = |index| StreamError::InvalidEdit {
                op: op_index,
                index,
                len,
            };
            match op {
                EditOp::Insert { index, record } => {
                    if *index > len {
                        return Err(invalid(*index));
                    }
                    target.insert(*index, record.clone());
                }
                EditOp::Remove { index } => {
                    if *index >= len {
                        return Err(invalid(*index));
                    }
                    target.remove(*index);
                }
                EditOp::Move { from, to } => {
                    if *from >= len {
                        return Err(invalid(*from));
                    }
                    if *to >= len {
                        return Err(invalid(*to));
                    }
                    let record = target.remove(*from);
                    target.insert(*to, record);
                }
                EditOp::Update { index, record } => match target.get_mut(*index) {
                    Some(slot) => *slot = record.clone(),
                    None => return Err(invalid(*index)),
                },
            }
        }
        Ok(())
    }
}

impl<R> IntoIterator for EditScript<R> {
    type Item = EditOp<R>;
    type IntoIter = std::vec::IntoIter<EditOp<R>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl<'a, R> IntoIterator for &'a EditScript<R> {
    type Item = &'a EditOp<R>;
    type IntoIter = std::slice::Iter<'a, EditOp<R>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

/// Bookkeeping for a record while the script is being built.
#[derive(Clone, Copy)]
struct Slot {
    target: usize,
    anchored: bool,
}

/// Compute the edit script transforming `old` into `new`.
///
/// Both sides must hold keyed records with unique keys. Removes come first,
/// highest index first. Inserts and moves follow in ascending target index;
/// records on the longest run of already-ordered survivors stay put. Updates
/// for survivors whose fields changed come last, at their final index.
pub fn diff<R: Record>(old: &[R], new: &[R]) -> EditScript<R> {
    let mut ops = Vec::new();

    let new_index: HashMap<&str, usize> = new
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.key().map(|k| (k, i)))
        .collect();

    for (i, record) in old.iter().enumerate().rev() {
        let kept = record.key().map_or(false, |k| new_index.contains_key(k));
        if !kept {
            ops.push(EditOp::Remove { index: i });
        }
    }

    // Survivors in their current order, tagged with their target index.
    let mut previous: HashMap<usize, &R> = HashMap::new();
    let targets: Vec<usize> = old
        .iter()
        .filter_map(|r| {
            let target = *new_index.get(r.key()?)?;
            previous.insert(target, r);
            Some(target)
        })
        .collect();

    let stable: HashSet<usize> = lis::longest_increasing(&targets).into_iter().collect();
    let mut current: Vec<Slot> = targets
        .iter()
        .map(|&target| Slot {
            target,
            anchored: stable.contains(&target),
        })
        .collect();

    for (target, record) in new.iter().enumerate() {
        if stable.contains(&target) {
            continue;
        }

        let from = current.iter().position(|s| s.target == target);
        if let Some(from) = from {
            current.remove(from);
        }

        let to = current
            .iter()
            .rposition(|s| s.anchored && s.target < target)
            .map_or(0, |p| p + 1);
        current.insert(
            to,
            Slot {
                target,
                anchored: true,
            },
        );

        match from {
            Some(from) if from != to => ops.push(EditOp::Move { from, to }),
            Some(_) => {}
            None => ops.push(EditOp::Insert {
                index: to,
                record: record.clone(),
            }),
        }
    }

    for (target, record) in new.iter().enumerate() {
        if let Some(before) = previous.get(&target) {
            if before.fields() != record.fields() {
                ops.push(EditOp::Update {
                    index: target,
                    record: record.clone(),
                });
            }
        }
    }

    EditScript::new(ops)
}
