//! CLI error types.

use recsync_engine::SyncError;
use recsync_storage::StorageError;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    /// Sync bookkeeping or a remote call failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The state directory could not be used.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Output could not be serialized.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The async runtime could not be started.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No record matches the given id.
    #[error("no entry matches '{0}'")]
    NotFound(String),

    /// An id prefix matches several records.
    #[error("'{prefix}' matches {count} entries, use a longer prefix")]
    Ambiguous {
        /// The prefix given.
        prefix: String,
        /// Number of matches.
        count: usize,
    },

    /// An argument is out of range.
    #[error("invalid {field}: {reason}")]
    InvalidArgument {
        /// Argument name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl CliError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }
}
