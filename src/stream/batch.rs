//! Coalescing of mutation bursts into one batch.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Source of time for the coalescer.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Fixed-window batch timer.
///
/// The window opens on the first buffered call and closes `delay` later, no
/// matter how many calls follow. With no delay every call is its own batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCoalescer {
    delay: Option<Duration>,
    deadline: Option<Instant>,
}

impl BatchCoalescer {
    pub fn new(delay: Option<Duration>) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    pub fn is_immediate(&self) -> bool {
        self.delay.is_none()
    }

    /// Open the window if it is not already open. Returns true if this call opened it.
    pub fn arm(&mut self, now: Instant) -> bool {
        match (self.delay, self.deadline) {
            (Some(delay), None) => {
                self.deadline = Some(now + delay);
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.map_or(false, |deadline| now >= deadline)
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_fixed_from_first_call() {
        let clock = ManualClock::new();
        let mut coalescer = BatchCoalescer::new(Some(Duration::from_millis(100)));
        let start = clock.now();

        assert!(coalescer.arm(clock.now()));
        clock.advance(Duration::from_millis(60));
        assert!(!coalescer.arm(clock.now()));
        assert_eq!(coalescer.deadline(), Some(start + Duration::from_millis(100)));

        assert!(!coalescer.is_due(clock.now()));
        clock.advance(Duration::from_millis(40));
        assert!(coalescer.is_due(clock.now()));

        coalescer.cancel();
        assert!(!coalescer.is_armed());
    }

    #[test]
    fn immediate_coalescer_never_arms() {
        let mut coalescer = BatchCoalescer::new(None);
        assert!(coalescer.is_immediate());
        assert!(!coalescer.arm(Instant::now()));
        assert!(!coalescer.is_due(Instant::now()));
    }
}
