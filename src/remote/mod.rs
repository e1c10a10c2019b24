//! Remote store collaborator - range queries and live change feeds.
//!
//! The stream never talks to a network itself. It consumes a [`RemoteStore`]
//! that can answer ordered range queries and hand out [`Subscription`]s
//! delivering [`ChangeEvent`]s with at-least-once semantics per key.
//!
//! ```text
//! ┌──────────────┐  query(range)      ┌──────────────────┐
//! │    Stream    │ ─────────────────▶ │   RemoteStore    │
//! │  (live mode) │  subscribe(range)  │  (collaborator)  │
//! │              │ ◀───────────────── │                  │
//! └──────────────┘  poll() -> events  └──────────────────┘
//! ```

mod in_memory;
mod payload;

use crate::error::RemoteError;
use crate::query::RangeQuery;
use crate::record::Document;

pub use in_memory::{InMemoryRemoteStore, InMemorySubscription};
pub use payload::{ChangeEvent, ChangeKind, Payload, PayloadFormat};

/// Result of a range query: matching records in ascending native order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeSnapshot {
    pub records: Vec<Document>,
    /// More records match than the limit allowed.
    pub has_more: bool,
}

/// Store that can answer range queries and stream changes.
pub trait RemoteStore: Send + Sync {
    /// Fetch an ordered, bounded snapshot.
    fn query(&self, range: &RangeQuery) -> Result<RangeSnapshot, RemoteError>;

    /// Start delivering changes relevant to `range`. Events committed after
    /// this call are guaranteed to be delivered.
    fn subscribe(&self, range: &RangeQuery) -> Result<Box<dyn Subscription>, RemoteError>;
}

/// Pull-based change feed.
pub trait Subscription: Send {
    /// Poll for the next event, blocking until one is available or timeout.
    /// An error means the subscription is lost.
    fn poll(&self, timeout_ms: u64) -> Result<Option<ChangeEvent>, RemoteError>;
}
