//! Error types for the sync client.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The response could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered `success: false`.
    #[error("server rejected sync: {0}")]
    Rejected(String),

    /// Device is offline.
    #[error("not connected to server")]
    NotConnected,

    /// No caller identity is available.
    #[error("no authenticated user")]
    Unauthenticated,

    /// Client state could not be read or written.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A local mutator refused the change.
    #[error(transparent)]
    Engine(#[from] tally_engine::Error),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the next pass may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Rejected(_) | SyncError::NotConnected => true,
            _ => false,
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Persistence(err.to_string())
    }
}
