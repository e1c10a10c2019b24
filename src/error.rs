use std::fmt;

/// Error type for stream, query and edit-script operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Rejected at construction time (negative limit, conflicting bounds, ...).
    InvalidConfiguration(String),
    /// A single remote event could not be turned into a record.
    MalformedEvent { key: Option<String>, reason: String },
    /// The remote subscription was lost; the window can no longer be trusted.
    StreamInterrupted(String),
    /// A mutation arrived after the stream was closed.
    ClosedStreamUse,
    /// An edit operation referenced an index outside the target sequence.
    InvalidEdit { op: usize, index: usize, len: usize },
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::InvalidConfiguration(msg) => {
                write!(f, "invalid stream configuration: {}", msg)
            }
            StreamError::MalformedEvent { key, reason } => match key {
                Some(key) => write!(f, "malformed event for {}: {}", key, reason),
                None => write!(f, "malformed event: {}", reason),
            },
            StreamError::StreamInterrupted(reason) => write!(f, "stream interrupted: {}", reason),
            StreamError::ClosedStreamUse => write!(f, "stream is closed"),
            StreamError::InvalidEdit { op, index, len } => write!(
                f,
                "edit operation {} references index {} (sequence length {})",
                op, index, len
            ),
        }
    }
}

impl std::error::Error for StreamError {}

/// Error type reported by a remote store collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The subscription or connection is gone.
    Disconnected(String),
    /// Storage-level error.
    Storage(String),
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Disconnected(msg) => write!(f, "remote disconnected: {}", msg),
            RemoteError::Storage(msg) => write!(f, "remote storage error: {}", msg),
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<RemoteError> for StreamError {
    fn from(err: RemoteError) -> Self {
        StreamError::StreamInterrupted(err.to_string())
    }
}
