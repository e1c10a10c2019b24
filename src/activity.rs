//! Activity tracking - a shared in-flight counter with guaranteed release.
//!
//! Keep an [`Inflight`] guard alive for the duration of an outstanding
//! network operation. The indicator callback only fires when the count moves
//! between zero and one, so overlapping operations do not toggle it
//! repeatedly.
//!
//! ```
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//! use streambase_rust::ActivityTracker;
//!
//! let visible = Arc::new(AtomicBool::new(false));
//! let flag = Arc::clone(&visible);
//! let tracker = ActivityTracker::new(move |active| flag.store(active, Ordering::SeqCst));
//!
//! let guard = tracker.begin();
//! assert!(visible.load(Ordering::SeqCst));
//! drop(guard);
//! assert!(!visible.load(Ordering::SeqCst));
//! ```

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Indicator = dyn Fn(bool) + Send + Sync;

/// Injectable, reference-counted activity counter. Clones share the count.
#[derive(Clone)]
pub struct ActivityTracker {
    count: Arc<AtomicUsize>,
    indicator: Arc<Indicator>,
}

impl ActivityTracker {
    /// Create a tracker. `indicator(true)` on 0 -> 1, `indicator(false)` on 1 -> 0.
    pub fn new<F>(indicator: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        Self {
            count: Arc::new(AtomicUsize::new(0)),
            indicator: Arc::new(indicator),
        }
    }

    /// A tracker with no indicator.
    pub fn silent() -> Self {
        Self::new(|_| {})
    }

    /// Mark the start of an operation. Released when the guard drops.
    pub fn begin(&self) -> Inflight {
        if self.count.fetch_add(1, Ordering::SeqCst) == 0 {
            (self.indicator)(true);
        }
        Inflight {
            tracker: self.clone(),
        }
    }

    /// Number of operations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.in_flight() > 0
    }

    fn release(&self) {
        let previous = self.count.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "activity counter underflow");
        if previous == 1 {
            (self.indicator)(false);
        }
    }
}

impl fmt::Debug for ActivityTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityTracker")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Guard for one in-flight operation.
#[must_use = "the operation is released as soon as the guard drops"]
pub struct Inflight {
    tracker: ActivityTracker,
}

impl Drop for Inflight {
    fn drop(&mut self) {
        self.tracker.release();
    }
}
