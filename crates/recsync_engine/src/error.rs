//! Error types for the sync engine.

use crate::report::PartialFailure;
use recsync_protocol::{ProtocolError, RemoteId};
use recsync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for remote provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors reported by a [`crate::RemoteProvider`].
///
/// Every provider call fails independently. The coordinator decides per call
/// site whether a failure is recovered, counted or returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The remote store is not reachable.
    #[error("remote store unavailable")]
    Unavailable,

    /// The remote has no schema for this record type yet.
    #[error("record type '{record_type}' is not provisioned on the remote")]
    SchemaMissing {
        /// Record type that was requested.
        record_type: String,
    },

    /// The record does not exist on the remote.
    #[error("remote record {remote_id} not found")]
    NotFound {
        /// Identifier that was requested.
        remote_id: RemoteId,
    },

    /// The remote refused the record.
    #[error("remote rejected record: {0}")]
    Rejected(String),

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The backend's own storage failed.
    #[error("backend I/O error: {0}")]
    Io(String),
}

impl ProviderError {
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

    /// Returns true if the same call may succeed when repeated later.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport { retryable, .. } => *retryable,
            ProviderError::Unavailable | ProviderError::Io(_) => true,
            _ => false,
        }
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        ProviderError::Io(err.to_string())
    }
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A remote provider call failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The local state store failed.
    #[error("state store error: {0}")]
    Storage(#[from] StorageError),

    /// A record could not be encoded or decoded.
    #[error("record codec error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Persisted state could not be parsed or written as JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted state is structurally wrong.
    #[error("corrupt state under '{key}': {reason}")]
    CorruptState {
        /// State key.
        key: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The configuration cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A full sync for this entity type is already running.
    #[error("a sync of '{entity_type}' is already in progress")]
    SyncInProgress {
        /// Entity type being synced.
        entity_type: String,
    },

    /// Some uploads of a completed pass failed.
    #[error("sync completed with {0}")]
    PartialFailure(PartialFailure),

    /// Persisted records use a schema version newer than this build knows.
    #[error("record archive has schema version {found}, newest supported is {supported}")]
    UnsupportedSchemaVersion {
        /// Version found in the archive.
        found: u32,
        /// Newest version this build reads.
        supported: u32,
    },

    /// No migration is registered for a schema version.
    #[error("no migration registered from schema version {from}")]
    MissingMigration {
        /// Version that has no migration.
        from: u32,
    },

    /// A migration function failed.
    #[error("migration from schema version {from} failed: {reason}")]
    MigrationFailed {
        /// Source version.
        from: u32,
        /// Failure reason.
        reason: String,
    },

    /// The worker thread could not be started.
    #[error("failed to start sync worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// The worker thread has stopped.
    #[error("sync worker has shut down")]
    WorkerClosed,
}

impl SyncError {
    /// Returns true if this error belongs to the class reported to callers of
    /// a full sync.
    ///
    /// Every other failure during a full sync is recovered inside the engine.
    pub fn is_surfaced(&self) -> bool {
        matches!(self, SyncError::PartialFailure(_))
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Provider(e) => e.is_retryable(),
            SyncError::SyncInProgress { .. } | SyncError::PartialFailure(_) => true,
            _ => false,
        }
    }
}
