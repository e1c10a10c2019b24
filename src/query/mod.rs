//! Query construction - comparators and range descriptors for a stream.
//!
//! A stream does much of the store's work on the client: it sorts, merges and
//! trims locally. The same ordering therefore has to exist twice, as a local
//! [`Comparator`] and as a [`RangeQuery`] the store can execute. Both are
//! derived from one [`QueryBuilder`] so they cannot drift apart.
//!
//! ## Example
//!
//! ```
//! use streambase_rust::{PageLimit, QueryBuilder};
//!
//! let query = QueryBuilder::new()
//!     .ordered_by_child("score")
//!     .descending()
//!     .limit(20)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(query.range_query().limit, Some(PageLimit::Last(21)));
//! ```

mod comparator;
mod pager;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;

use crate::error::StreamError;
use crate::record::Record;
use crate::value::FieldValue;

pub use comparator::Comparator;
pub use pager::{PageLimit, Pager, RangeQuery};

/// What records are ordered by.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    /// The record key, lexicographically.
    #[default]
    Key,
    /// The value of a named field.
    Child(String),
}

/// Unvalidated query configuration. Call [`QueryBuilder::build`] to get a [`Query`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryBuilder {
    pub order_by: OrderBy,
    /// Ascending is the store's native order. Descending is needed for
    /// newest-first views such as chat transcripts.
    pub ascending: bool,
    /// Where to start. A key under key ordering, otherwise a field value.
    pub start: Option<FieldValue>,
    /// Where to end. A key under key ordering, otherwise a field value.
    pub end: Option<FieldValue>,
    /// Maximum number of records in the window. `None` fetches everything.
    pub limit: Option<i64>,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self {
            order_by: OrderBy::Key,
            ascending: true,
            start: None,
            end: None,
            limit: None,
        }
    }
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ordered_by_key(mut self) -> Self {
        self.order_by = OrderBy::Key;
        self
    }

    pub fn ordered_by_child(mut self, name: impl Into<String>) -> Self {
        self.order_by = OrderBy::Child(name.into());
        self
    }

    pub fn ascending(mut self) -> Self {
        self.ascending = true;
        self
    }

    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }

    pub fn starting_at(mut self, value: impl Into<FieldValue>) -> Self {
        self.start = Some(value.into());
        self
    }

    pub fn ending_at(mut self, value: impl Into<FieldValue>) -> Self {
        self.end = Some(value.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Validate the configuration.
    pub fn build(self) -> Result<Query, StreamError> {
        let limit = match self.limit {
            Some(l) if l < 0 => {
                return Err(StreamError::InvalidConfiguration(format!(
                    "limit must be non-negative, got {}",
                    l
                )))
            }
            Some(l) => Some(l as usize),
            None => None,
        };

        if self.order_by == OrderBy::Key {
            for bound in [&self.start, &self.end].into_iter().flatten() {
                if bound.as_str().is_none() {
                    return Err(StreamError::InvalidConfiguration(format!(
                        "key-ordered bounds must be keys, got {:?}",
                        bound
                    )));
                }
            }
        }

        // In descending order start is the high end of the range.
        if let (Some(start), Some(end)) = (&self.start, &self.end) {
            let expected = if self.ascending {
                CmpOrdering::Greater
            } else {
                CmpOrdering::Less
            };
            if FieldValue::native_cmp(start, end) == expected {
                return Err(StreamError::InvalidConfiguration(format!(
                    "conflicting bounds: start {:?} lies beyond end {:?}",
                    start, end
                )));
            }
        }

        Ok(Query {
            order_by: self.order_by,
            ascending: self.ascending,
            start: self.start,
            end: self.end,
            limit,
        })
    }
}

/// A validated query: source of the comparator, the pager and the range descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    order_by: OrderBy,
    ascending: bool,
    start: Option<FieldValue>,
    end: Option<FieldValue>,
    limit: Option<usize>,
}

impl Query {
    /// The whole collection in ascending key order.
    pub fn all() -> Self {
        Self {
            order_by: OrderBy::Key,
            ascending: true,
            start: None,
            end: None,
            limit: None,
        }
    }

    pub fn order_by(&self) -> &OrderBy {
        &self.order_by
    }

    pub fn is_ascending(&self) -> bool {
        self.ascending
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn comparator(&self) -> Comparator {
        Comparator::new(self.order_by.clone(), self.ascending)
    }

    pub fn pager(&self) -> Pager {
        Pager::new(self.order_by.clone(), self.ascending)
    }

    /// The range descriptor for the configured bounds.
    pub fn range_query(&self) -> RangeQuery {
        self.pager()
            .page(self.start.clone(), self.end.clone(), self.limit)
    }

    /// Whether a record falls inside the configured bounds, under the store's
    /// native ordering with inclusive ends.
    pub fn in_bounds<R: Record>(&self, record: &R) -> bool {
        self.range_query().contains(record)
    }
}
