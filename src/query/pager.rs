use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;

use super::OrderBy;
use crate::record::Record;
use crate::value::FieldValue;

/// Which end of the ascending range a limit is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageLimit {
    First(usize),
    Last(usize),
}

impl PageLimit {
    pub fn count(&self) -> usize {
        match self {
            PageLimit::First(n) | PageLimit::Last(n) => *n,
        }
    }
}

/// Parameters for the remote store's range query.
///
/// Always expressed in the store's native ascending order; direction is a
/// presentation concern layered on top by the comparator. The descriptor
/// performs no I/O.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeQuery {
    pub order_by: OrderBy,
    /// Inclusive low end.
    pub start_at: Option<FieldValue>,
    /// Inclusive high end.
    pub end_at: Option<FieldValue>,
    pub limit: Option<PageLimit>,
}

impl RangeQuery {
    /// The value a record is ranged on. Missing child values range as null.
    pub fn ordering_value<R: Record>(&self, record: &R) -> Option<FieldValue> {
        match &self.order_by {
            OrderBy::Key => record.key().map(FieldValue::from),
            OrderBy::Child(name) => Some(record.field(name).unwrap_or(FieldValue::Null)),
        }
    }

    /// Whether a record lies between the inclusive bounds.
    pub fn contains<R: Record>(&self, record: &R) -> bool {
        let value = match self.ordering_value(record) {
            Some(value) => value,
            None => return false,
        };
        self.contains_value(&value)
    }

    pub fn contains_value(&self, value: &FieldValue) -> bool {
        if let Some(start) = &self.start_at {
            if FieldValue::native_cmp(value, start) == CmpOrdering::Less {
                return false;
            }
        }
        if let Some(end) = &self.end_at {
            if FieldValue::native_cmp(value, end) == CmpOrdering::Greater {
                return false;
            }
        }
        true
    }
}

/// Turns `(start, end, limit)` into a [`RangeQuery`] for one ordering and direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Pager {
    order_by: OrderBy,
    ascending: bool,
}

impl Pager {
    pub fn new(order_by: OrderBy, ascending: bool) -> Self {
        Self {
            order_by,
            ascending,
        }
    }

    /// Build the descriptor. One record past `limit` is requested so the
    /// stream can tell whether more exist beyond the window.
    pub fn page(
        &self,
        start: Option<FieldValue>,
        end: Option<FieldValue>,
        limit: Option<usize>,
    ) -> RangeQuery {
        if self.ascending {
            RangeQuery {
                order_by: self.order_by.clone(),
                start_at: start,
                end_at: end,
                limit: limit.map(|l| PageLimit::First(l + 1)),
            }
        } else {
            RangeQuery {
                order_by: self.order_by.clone(),
                start_at: end,
                end_at: start,
                limit: limit.map(|l| PageLimit::Last(l + 1)),
            }
        }
    }
}
