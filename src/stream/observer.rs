//! Observer - the presentation-side consumer of edit scripts.

use std::sync::{Arc, Mutex};

use crate::diff::EditScript;
use crate::error::StreamError;

/// Receives one notification per closed batch, synchronously and in order.
///
/// Records are handed out by reference; observers that keep them must clone.
pub trait StreamObserver<R> {
    /// A batch closed. `window` is the visible window after applying `script`.
    fn on_diff(&mut self, script: &EditScript<R>, window: &[R]);

    /// The live feed was lost. Distinct from an empty diff: the view can no
    /// longer be trusted until the stream is reloaded.
    fn on_stream_interrupted(&mut self, reason: &StreamError);
}

/// A notification captured by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq)]
pub enum Notification<R> {
    Diff {
        script: EditScript<R>,
        window: Vec<R>,
    },
    Interrupted(StreamError),
}

/// Observer that records every notification. Clones share the log.
#[derive(Debug)]
pub struct RecordingObserver<R> {
    log: Arc<Mutex<Vec<Notification<R>>>>,
}

impl<R> Clone for RecordingObserver<R> {
    fn clone(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
        }
    }
}

impl<R> Default for RecordingObserver<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> RecordingObserver<R> {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.log.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut log) = self.log.lock() {
            log.clear();
        }
    }

    fn push(&self, notification: Notification<R>) {
        if let Ok(mut log) = self.log.lock() {
            log.push(notification);
        }
    }
}

impl<R: Clone> RecordingObserver<R> {
    pub fn notifications(&self) -> Vec<Notification<R>> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Edit scripts in delivery order.
    pub fn scripts(&self) -> Vec<EditScript<R>> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Diff { script, .. } => Some(script),
                Notification::Interrupted(_) => None,
            })
            .collect()
    }

    /// The window delivered with the most recent diff.
    pub fn last_window(&self) -> Option<Vec<R>> {
        self.notifications().into_iter().rev().find_map(|n| match n {
            Notification::Diff { window, .. } => Some(window),
            Notification::Interrupted(_) => None,
        })
    }

    pub fn interruptions(&self) -> Vec<StreamError> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Interrupted(reason) => Some(reason),
                Notification::Diff { .. } => None,
            })
            .collect()
    }
}

impl<R: Clone> StreamObserver<R> for RecordingObserver<R> {
    fn on_diff(&mut self, script: &EditScript<R>, window: &[R]) {
        self.push(Notification::Diff {
            script: script.clone(),
            window: window.to_vec(),
        });
    }

    fn on_stream_interrupted(&mut self, reason: &StreamError) {
        self.push(Notification::Interrupted(reason.clone()));
    }
}
