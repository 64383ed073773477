//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key contains characters that cannot be stored.
    #[error("invalid state key {key:?}: {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Another process holds the state directory lock.
    #[error("state directory locked: another process has exclusive access to {0}")]
    Locked(String),

    /// The state directory is unusable.
    #[error("state directory unusable: {0}")]
    InvalidDirectory(String),

    /// Writes were disabled on the store.
    #[error("store is read-only")]
    ReadOnly,
}
