//! Error types for watch operations.

use thiserror::Error;

/// Main error type for watch operations.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Event index cleared: requested {requested}, oldest retained is {oldest} (current {current})")]
    EventIndexCleared {
        requested: u64,
        oldest: u64,
        current: u64,
    },

    #[error("Invalid history capacity: {0}")]
    InvalidCapacity(usize),

    #[error("Invalid watch index: {0}")]
    InvalidIndex(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Watcher closed")]
    WatcherClosed,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for WatchError {
    fn from(e: serde_json::Error) -> Self {
        WatchError::Serialization(e.to_string())
    }
}

/// Result type for watch operations.
pub type Result<T> = std::result::Result<T, WatchError>;
