//! streambase_rust - a client-side mirror of a remote, ordered collection.
//!
//! A [`Stream`] keeps a sorted, optionally limited window of records, merges
//! local mutations or remote change events into it, and reports every closed
//! batch as a minimal [`EditScript`] a list view can replay.

mod activity;
mod diff;
mod error;
mod query;
mod record;
mod remote;
mod stream;
mod value;

pub use activity::{ActivityTracker, Inflight};
pub use diff::{diff, EditCounts, EditOp, EditScript};
pub use error::{RemoteError, StreamError};
pub use query::{Comparator, OrderBy, PageLimit, Pager, Query, QueryBuilder, RangeQuery};
pub use record::{decode_fields, fields_of, same_key, Document, Record};
pub use remote::{
    ChangeEvent, ChangeKind, InMemoryRemoteStore, InMemorySubscription, Payload, PayloadFormat,
    RangeSnapshot, RemoteStore, Subscription,
};
pub use stream::{
    Batch, BatchCoalescer, Clock, LiveStats, LiveStreamThread, ManualClock, Notification,
    PumpOutcome, RecordingObserver, Stream, StreamConfig, StreamObserver, StreamState,
    SystemClock, DEFAULT_LIVE_BATCH_DELAY,
};
pub use value::{fields_from_json, FieldValue, Fields};
