use std::cmp::Ordering as CmpOrdering;

use super::OrderBy;
use crate::record::Record;
use crate::value::FieldValue;

/// Local sort order of a stream, data rather than a closure.
///
/// Descending order swaps the arguments of the primary comparison. Ties on
/// the primary value are broken by key ascending, so the order is strict and
/// deterministic even for missing or non-unique sort fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparator {
    order_by: OrderBy,
    ascending: bool,
}

impl Comparator {
    pub fn new(order_by: OrderBy, ascending: bool) -> Self {
        Self {
            order_by,
            ascending,
        }
    }

    pub fn is_key_ordered(&self) -> bool {
        self.order_by == OrderBy::Key
    }

    pub fn is_ascending(&self) -> bool {
        self.ascending
    }

    /// `true` iff `a` sorts strictly before `b`.
    pub fn before<R: Record>(&self, a: &R, b: &R) -> bool {
        self.cmp(a, b) == CmpOrdering::Less
    }

    pub fn cmp<R: Record>(&self, a: &R, b: &R) -> CmpOrdering {
        let primary = if self.ascending {
            self.primary(a, b)
        } else {
            self.primary(b, a)
        };
        primary.then_with(|| a.key().cmp(&b.key()))
    }

    fn primary<R: Record>(&self, a: &R, b: &R) -> CmpOrdering {
        match &self.order_by {
            OrderBy::Key => a.key().cmp(&b.key()),
            OrderBy::Child(name) => {
                FieldValue::compare_sort(a.field(name).as_ref(), b.field(name).as_ref())
            }
        }
    }

    /// Compare a record against a bare key under key ordering.
    pub(crate) fn cmp_key<R: Record>(&self, record: &R, key: &str) -> CmpOrdering {
        let ord = record.key().cmp(&Some(key));
        if self.ascending {
            ord
        } else {
            ord.reverse()
        }
    }
}
