//! Streams - ordered, windowed mirrors of a collection.
//!
//! A [`Stream`] owns the current window of records, applies the query's sort
//! order, accepts local mutations or remote change events, and turns every
//! closed batch into one [`EditScript`] for its observer.
//!
//! ```text
//!   local calls ─┐
//!                ├─▶ scratch window ──(batch closes)──▶ diff ──▶ observer
//!  remote feed ──┘        ▲
//!                         └── BatchCoalescer (optional fixed delay)
//! ```
//!
//! Two modes share one interface:
//!
//! - **Transient** streams hold only locally supplied records and deliver
//!   every mutation call as its own batch unless a delay is configured.
//! - **Live** streams are backed by a [`RemoteStore`]. [`Stream::load`]
//!   subscribes and fetches the initial range; events are fed through
//!   [`Stream::apply_event`] or [`Stream::pump`], coalesced by default.
//!
//! ## Example
//!
//! ```
//! use streambase_rust::{Document, QueryBuilder, Record, RecordingObserver, Stream};
//!
//! let query = QueryBuilder::new().limit(2).build().unwrap();
//! let observer = RecordingObserver::new();
//! let mut stream = Stream::transient(query).with_observer(observer.clone());
//!
//! stream
//!     .add(vec![Document::new("z"), Document::new("a"), Document::new("m")])
//!     .unwrap();
//!
//! let keys: Vec<_> = stream.items().iter().map(|d| d.key().unwrap()).collect();
//! assert_eq!(keys, vec!["a", "m"]);
//! assert!(stream.has_more());
//! assert_eq!(observer.scripts()[0].len(), 2);
//! ```
//!
//! Mutations after [`Stream::close`] fail with [`StreamError::ClosedStreamUse`]
//! and leave the stream untouched.

mod batch;
mod config;
mod observer;
mod thread;
mod window;

use std::fmt;
use std::ops::Index;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::activity::ActivityTracker;
use crate::diff::{diff, EditScript};
use crate::error::StreamError;
use crate::query::{Comparator, Query};
use crate::record::Record;
use crate::remote::{ChangeEvent, RemoteStore, Subscription};

pub use batch::{BatchCoalescer, Clock, ManualClock, SystemClock};
pub use config::StreamConfig;
pub use observer::{Notification, RecordingObserver, StreamObserver};
pub use thread::{LiveStats, LiveStreamThread};
pub use window::Batch;

use window::Window;

/// Coalescing delay live streams start with.
pub const DEFAULT_LIVE_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Lifecycle of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Live stream that has not loaded yet.
    Empty,
    /// Initial range query in flight.
    Loading,
    /// Window populated; transient streams start here.
    Synced,
    /// The live feed was lost. `load()` resumes, `close()` ends.
    Interrupted,
    /// Terminal.
    Closed,
}

/// Outcome of one [`Stream::pump`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// No event arrived within the timeout.
    Idle,
    /// An event was merged into the pending batch.
    Applied,
    /// A malformed event was logged and dropped.
    Dropped,
}

enum Mode {
    Transient,
    Live {
        store: Arc<dyn RemoteStore>,
        subscription: Option<Box<dyn Subscription>>,
    },
}

/// Ordered, windowed collection that emits edit scripts.
pub struct Stream<R: Record> {
    query: Query,
    comparator: Comparator,
    mode: Mode,
    state: StreamState,
    window: Window<R>,
    scratch: Option<Window<R>>,
    coalescer: BatchCoalescer,
    clock: Box<dyn Clock>,
    observer: Option<Box<dyn StreamObserver<R> + Send>>,
    activity: Option<ActivityTracker>,
    has_more: bool,
    batches: u64,
}

impl<R: Record> Stream<R> {
    /// A stream holding only locally supplied records. No coalescing.
    pub fn transient(query: Query) -> Self {
        Self::with_mode(query, Mode::Transient, StreamState::Synced, None)
    }

    /// A stream mirroring `store`. Call [`Stream::load`] to start syncing.
    pub fn live(query: Query, store: Arc<dyn RemoteStore>) -> Self {
        let mode = Mode::Live {
            store,
            subscription: None,
        };
        Self::with_mode(query, mode, StreamState::Empty, Some(DEFAULT_LIVE_BATCH_DELAY))
    }

    /// A transient stream built from deserialized settings.
    pub fn transient_from_config(config: StreamConfig) -> Result<Self, StreamError> {
        let stream = Self::transient(config.query.clone().build()?);
        Ok(stream.with_configured_delay(&config))
    }

    /// A live stream built from deserialized settings. An unset delay keeps
    /// [`DEFAULT_LIVE_BATCH_DELAY`].
    pub fn live_from_config(
        config: StreamConfig,
        store: Arc<dyn RemoteStore>,
    ) -> Result<Self, StreamError> {
        let stream = Self::live(config.query.clone().build()?, store);
        Ok(stream.with_configured_delay(&config))
    }

    fn with_configured_delay(self, config: &StreamConfig) -> Self {
        match config.batch_delay() {
            Some(delay) => self.with_batch_delay(delay),
            None => self,
        }
    }

    fn with_mode(query: Query, mode: Mode, state: StreamState, delay: Option<Duration>) -> Self {
        let capacity = query.limit().map(|l| l + 1);
        let live = matches!(mode, Mode::Live { .. });
        Self {
            comparator: query.comparator(),
            query,
            mode,
            state,
            window: Window::new(capacity, live),
            scratch: None,
            coalescer: BatchCoalescer::new(delay),
            clock: Box::new(SystemClock),
            observer: None,
            activity: None,
            has_more: false,
            batches: 0,
        }
    }

    /// Set the coalescing delay. `None` delivers every mutation call immediately.
    pub fn with_batch_delay(mut self, delay: Option<Duration>) -> Self {
        self.coalescer = BatchCoalescer::new(delay);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Track range queries on a shared activity counter.
    pub fn with_activity(mut self, tracker: ActivityTracker) -> Self {
        self.activity = Some(tracker);
        self
    }

    pub fn with_observer(mut self, observer: impl StreamObserver<R> + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn set_observer(&mut self, observer: impl StreamObserver<R> + Send + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    // ---- reads ---------------------------------------------------------

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        matches!(self.mode, Mode::Live { .. })
    }

    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn comparator(&self) -> &Comparator {
        &self.comparator
    }

    /// The visible window as of the last closed batch. Never includes the
    /// lookahead record.
    pub fn items(&self) -> &[R] {
        visible(&self.window, self.query.limit())
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&R> {
        self.items().get(index)
    }

    /// Index of `key` in the visible window.
    pub fn find(&self, key: &str) -> Option<usize> {
        self.window
            .position(&self.comparator, key)
            .filter(|&i| i < self.len())
    }

    /// More records matched than the window shows.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// A batch is open and waiting for its delay to elapse.
    pub fn is_pending(&self) -> bool {
        self.scratch.is_some()
    }

    /// Number of batches delivered so far.
    pub fn batch_count(&self) -> u64 {
        self.batches
    }

    /// When the open batch is due, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.coalescer.deadline()
    }

    // ---- local mutations -----------------------------------------------

    /// Run several mutations as one batch.
    pub fn batch<F, T>(&mut self, f: F) -> Result<T, StreamError>
    where
        F: FnOnce(&mut Batch<'_, R>) -> T,
    {
        if self.state == StreamState::Closed {
            warn!("mutation on closed stream ignored");
            return Err(StreamError::ClosedStreamUse);
        }

        let now = self.clock.now();
        let mut scratch = self
            .scratch
            .take()
            .unwrap_or_else(|| self.window.scratch());
        let out = f(&mut Batch::new(&mut scratch, &self.comparator, &self.query));
        self.scratch = Some(scratch);

        if self.coalescer.is_immediate() {
            self.flush();
        } else if self.coalescer.arm(now) {
            debug!("batch opened, closes in {:?}", self.coalescer.delay());
        }
        Ok(out)
    }

    /// Replace the whole window content.
    pub fn reset<I: IntoIterator<Item = R>>(&mut self, records: I) -> Result<(), StreamError> {
        self.batch(|b| b.reset(records))
    }

    /// Merge records at their sorted positions.
    pub fn add<I: IntoIterator<Item = R>>(&mut self, records: I) -> Result<(), StreamError> {
        self.batch(|b| b.add_all(records))
    }

    /// Remove records by key. Absent keys are ignored.
    pub fn remove<'a, I>(&mut self, records: I) -> Result<(), StreamError>
    where
        I: IntoIterator<Item = &'a R>,
        R: 'a,
    {
        self.batch(|b| {
            for record in records {
                b.remove(record);
            }
        })
    }

    pub fn remove_keys<'k, I>(&mut self, keys: I) -> Result<(), StreamError>
    where
        I: IntoIterator<Item = &'k str>,
    {
        self.batch(|b| {
            for key in keys {
                b.remove_key(key);
            }
        })
    }

    /// Replace a record by key; inserted if absent.
    pub fn update(&mut self, record: R) -> Result<(), StreamError> {
        self.batch(|b| b.update(record))
    }

    // ---- batch lifecycle -----------------------------------------------

    /// Close the open batch if its delay has elapsed. Returns true if a diff
    /// was delivered.
    pub fn tick(&mut self) -> bool {
        if self.coalescer.is_due(self.clock.now()) {
            self.flush()
        } else {
            false
        }
    }

    /// Close the open batch now, regardless of the delay.
    pub fn flush_now(&mut self) -> bool {
        self.flush()
    }

    fn flush(&mut self) -> bool {
        self.coalescer.cancel();
        let mut next = match self.scratch.take() {
            Some(next) => next,
            None => return false,
        };

        let limit = self.query.limit();
        if next.is_partial() && limit.map_or(false, |l| next.len() <= l) {
            self.refill(&mut next);
        }

        let truncated = next.finalize(limit);
        let script = diff(self.items(), visible(&next, limit));

        self.window = next;
        self.has_more = truncated;
        self.batches += 1;
        debug!(
            "batch {} closed: {} ops, {} visible, more={}",
            self.batches,
            script.len(),
            self.len(),
            self.has_more
        );

        self.deliver(&script);
        true
    }

    fn deliver(&mut self, script: &EditScript<R>) {
        let window = visible(&self.window, self.query.limit());
        if let Some(observer) = self.observer.as_mut() {
            observer.on_diff(script, window);
        }
    }

    /// The window shrank to the limit or below while the store holds more:
    /// fetch the range again so the next records move up.
    fn refill(&self, next: &mut Window<R>) {
        let store = match &self.mode {
            Mode::Live { store, .. } => Arc::clone(store),
            Mode::Transient => return,
        };
        let _inflight = self.activity.as_ref().map(|t| t.begin());
        match store.query(&self.query.range_query()) {
            Ok(snapshot) => {
                debug!("refilled window with {} records", snapshot.records.len());
                let records = snapshot
                    .records
                    .iter()
                    .map(|doc| R::from_parts(doc.key().map(String::from), Some(doc.raw_fields())));
                Batch::new(next, &self.comparator, &self.query).reset(records);
            }
            Err(e) => warn!("window refill failed: {}", e),
        }
    }

    // ---- live feed -----------------------------------------------------

    /// Subscribe to the store and populate the window from the range query.
    ///
    /// Also resumes an interrupted stream. The initial content is delivered
    /// as its own batch.
    pub fn load(&mut self) -> Result<(), StreamError> {
        if self.state == StreamState::Closed {
            return Err(StreamError::ClosedStreamUse);
        }
        let store = match &self.mode {
            Mode::Live { store, .. } => Arc::clone(store),
            Mode::Transient => {
                return Err(StreamError::InvalidConfiguration(
                    "transient streams have no remote store to load".into(),
                ))
            }
        };

        let resuming = self.state == StreamState::Interrupted;
        self.transition(StreamState::Loading);
        let range = self.query.range_query();
        let loaded = {
            let _inflight = self.activity.as_ref().map(|t| t.begin());
            store
                .subscribe(&range)
                .and_then(|sub| store.query(&range).map(|snapshot| (sub, snapshot)))
        };

        let (subscription, snapshot) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                let err = StreamError::from(e);
                if resuming {
                    // The observer already knows the feed is down.
                    self.transition(StreamState::Interrupted);
                } else {
                    self.interrupt(err.to_string());
                }
                return Err(err);
            }
        };

        if let Mode::Live { subscription: slot, .. } = &mut self.mode {
            *slot = Some(subscription);
        }

        let records: Vec<R> = snapshot
            .records
            .iter()
            .map(|doc| R::from_parts(doc.key().map(String::from), Some(doc.raw_fields())))
            .collect();
        self.batch(|b| b.reset(records))?;
        self.flush();
        self.transition(StreamState::Synced);
        Ok(())
    }

    /// Re-run the range query and diff it against the current window.
    pub fn refresh(&mut self) -> Result<(), StreamError> {
        if self.state == StreamState::Closed {
            return Err(StreamError::ClosedStreamUse);
        }
        let store = match &self.mode {
            Mode::Live { store, .. } => Arc::clone(store),
            Mode::Transient => {
                return Err(StreamError::InvalidConfiguration(
                    "transient streams have no remote store to refresh from".into(),
                ))
            }
        };

        let snapshot = {
            let _inflight = self.activity.as_ref().map(|t| t.begin());
            store.query(&self.query.range_query())
        }?;
        let records: Vec<R> = snapshot
            .records
            .iter()
            .map(|doc| R::from_parts(doc.key().map(String::from), Some(doc.raw_fields())))
            .collect();
        self.batch(|b| b.reset(records))?;
        self.flush();
        Ok(())
    }

    /// Merge one remote change into the pending batch.
    ///
    /// Returns `Ok(false)` when the event was malformed and dropped; the
    /// window is left untouched in that case.
    pub fn apply_event(&mut self, event: ChangeEvent) -> Result<bool, StreamError> {
        if self.state == StreamState::Closed {
            warn!("event for {} on closed stream ignored", event.key);
            return Err(StreamError::ClosedStreamUse);
        }

        let (key, fields) = match event.decode() {
            Ok((key, fields)) => (key.to_string(), fields),
            Err(e) => {
                warn!("dropping remote event: {}", e);
                return Ok(false);
            }
        };

        match fields {
            None => self.batch(|b| {
                b.remove_key(&key);
            })?,
            Some(fields) => {
                let record = R::from_parts(Some(key), Some(&fields));
                self.batch(|b| b.add(record))?
            }
        }
        Ok(true)
    }

    /// Poll the subscription for one event (waiting at most `timeout_ms`, or
    /// less if the open batch falls due sooner), apply it, then close the
    /// batch if it is due.
    ///
    /// Transient streams only tick. Losing the subscription interrupts the
    /// stream and returns [`StreamError::StreamInterrupted`].
    pub fn pump(&mut self, timeout_ms: u64) -> Result<PumpOutcome, StreamError> {
        if self.state == StreamState::Closed {
            return Err(StreamError::ClosedStreamUse);
        }

        let timeout_ms = match self.coalescer.deadline() {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(self.clock.now());
                timeout_ms.min(remaining.as_millis() as u64)
            }
            None => timeout_ms,
        };

        let polled = match &self.mode {
            Mode::Transient => None,
            Mode::Live {
                subscription: Some(subscription),
                ..
            } => Some(subscription.poll(timeout_ms)),
            Mode::Live {
                subscription: None,
                ..
            } => {
                return Err(StreamError::StreamInterrupted(
                    "no active subscription".into(),
                ))
            }
        };
        let polled = match polled {
            Some(polled) => polled,
            None => {
                self.tick();
                return Ok(PumpOutcome::Idle);
            }
        };

        let outcome = match polled {
            Ok(Some(event)) => {
                if self.apply_event(event)? {
                    PumpOutcome::Applied
                } else {
                    PumpOutcome::Dropped
                }
            }
            Ok(None) => PumpOutcome::Idle,
            Err(e) => {
                let err = StreamError::from(e);
                self.interrupt(err.to_string());
                return Err(err);
            }
        };

        self.tick();
        Ok(outcome)
    }

    /// Signal loss of the live feed to the observer.
    ///
    /// Whatever was already applied is delivered first, then the
    /// subscription is dropped and the stream waits in `Interrupted`.
    pub fn interrupt(&mut self, reason: impl Into<String>) {
        if matches!(self.state, StreamState::Interrupted | StreamState::Closed) {
            return;
        }
        self.flush();
        if let Mode::Live { subscription, .. } = &mut self.mode {
            *subscription = None;
        }
        self.transition(StreamState::Interrupted);

        let reason = StreamError::StreamInterrupted(reason.into());
        warn!("{}", reason);
        if let Some(observer) = self.observer.as_mut() {
            observer.on_stream_interrupted(&reason);
        }
    }

    /// Cancel the open batch, drop the subscription and stop accepting mutations.
    pub fn close(&mut self) {
        if self.state == StreamState::Closed {
            return;
        }
        if self.scratch.take().is_some() {
            debug!("pending batch discarded on close");
        }
        self.coalescer.cancel();
        if let Mode::Live { subscription, .. } = &mut self.mode {
            *subscription = None;
        }
        self.transition(StreamState::Closed);
    }

    fn transition(&mut self, state: StreamState) {
        if self.state != state {
            info!("stream {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}

fn visible<R: Record>(window: &Window<R>, limit: Option<usize>) -> &[R] {
    let items = window.items();
    match limit {
        Some(limit) if items.len() > limit => &items[..limit],
        _ => items,
    }
}

impl<R: Record> Index<usize> for Stream<R> {
    type Output = R;

    fn index(&self, index: usize) -> &R {
        &self.items()[index]
    }
}

impl<R: Record> fmt::Debug for Stream<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("state", &self.state)
            .field("live", &self.is_live())
            .field("len", &self.len())
            .field("has_more", &self.has_more)
            .field("pending", &self.is_pending())
            .field("batches", &self.batches)
            .finish()
    }
}
