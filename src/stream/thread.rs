//! Background thread driving a live stream.
//!
//! `LiveStreamThread` owns a [`Stream`] on its own thread, loads it, and
//! keeps pumping its subscription until stopped. Batches are delivered to the
//! stream's observer from that thread.

use std::sync::mpsc::{channel, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};

use super::{PumpOutcome, Stream, StreamState};
use crate::error::StreamError;
use crate::record::Record;

/// Statistics from the live stream thread.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LiveStats {
    /// Change events merged into the window.
    pub events_applied: usize,
    /// Malformed events that were dropped.
    pub events_dropped: usize,
    /// Batches delivered to the observer while the thread ran.
    pub batches_flushed: u64,
    /// Number of poll cycles completed.
    pub polls: usize,
    /// Times the feed was lost.
    pub interruptions: usize,
}

/// A background thread that keeps a live stream in sync.
///
/// Spawn, let it run, then stop it to get the stream and stats back.
///
/// ## Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use streambase_rust::{
///     Document, Fields, InMemoryRemoteStore, LiveStreamThread, QueryBuilder, Stream,
/// };
///
/// let store = InMemoryRemoteStore::new();
/// store.set("a", Fields::new()).unwrap();
///
/// let query = QueryBuilder::new().build().unwrap();
/// let stream: Stream<Document> = Stream::live(query, Arc::new(store.clone()));
/// let worker = LiveStreamThread::spawn(stream, Duration::from_millis(5));
///
/// store.set("b", Fields::new()).unwrap();
/// std::thread::sleep(Duration::from_millis(300));
///
/// let (stream, stats) = worker.stop();
/// assert_eq!(stream.unwrap().len(), 2);
/// assert!(stats.polls > 0);
/// ```
pub struct LiveStreamThread<R: Record> {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<(Stream<R>, LiveStats)>>,
}

impl<R> LiveStreamThread<R>
where
    R: Record + Send + 'static,
{
    /// Spawn the thread. Each cycle waits at most `poll_interval` for an event.
    ///
    /// An interrupted stream is reloaded on the next cycle.
    pub fn spawn(stream: Stream<R>, poll_interval: Duration) -> Self {
        let (stop_tx, stop_rx) = channel();
        let timeout_ms = poll_interval.as_millis() as u64;

        let handle = thread::spawn(move || {
            let mut stream = stream;
            let mut stats = LiveStats::default();
            let first_batch = stream.batch_count();

            loop {
                match stop_rx.try_recv() {
                    Ok(()) | Err(TryRecvError::Disconnected) => break,
                    Err(TryRecvError::Empty) => {}
                }

                match stream.state() {
                    StreamState::Closed => break,
                    StreamState::Synced => {}
                    _ => {
                        if let Err(e) = stream.load() {
                            debug!("live stream load failed: {}", e);
                            thread::sleep(poll_interval);
                            continue;
                        }
                    }
                }

                stats.polls += 1;
                match stream.pump(timeout_ms) {
                    Ok(PumpOutcome::Applied) => stats.events_applied += 1,
                    Ok(PumpOutcome::Dropped) => stats.events_dropped += 1,
                    Ok(PumpOutcome::Idle) => {}
                    Err(StreamError::ClosedStreamUse) => break,
                    Err(e) => {
                        warn!("live stream lost its feed: {}", e);
                        stats.interruptions += 1;
                        thread::sleep(poll_interval);
                    }
                }
            }

            stream.flush_now();
            stats.batches_flushed = stream.batch_count() - first_batch;
            (stream, stats)
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Signal the thread to stop and wait for it. Pending changes are
    /// delivered before the stream is handed back.
    ///
    /// The stream is `None` only if the thread panicked.
    pub fn stop(mut self) -> (Option<Stream<R>>, LiveStats) {
        let _ = self.stop_tx.send(());
        match self.handle.take().map(|h| h.join()) {
            Some(Ok((stream, stats))) => (Some(stream), stats),
            _ => (None, LiveStats::default()),
        }
    }

    /// Signal the thread to stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl<R: Record> Drop for LiveStreamThread<R> {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}
