//! Remote store abstraction.

mod directory;
mod memory;

pub use directory::DirectoryProvider;
pub use memory::InMemoryProvider;

use crate::error::ProviderResult;
use recsync_protocol::{RemoteId, RemoteRecord};
use std::sync::Arc;

/// A remote record store.
///
/// This trait abstracts the backend, allowing for different implementations
/// (a shared directory, a cloud record database, an in-memory mock for
/// testing, etc.). Calls are blocking; a coordinator issues them one at a time.
pub trait RemoteProvider: Send + Sync {
    /// Returns true if the store can currently be reached.
    fn is_available(&self) -> bool;

    /// Fetches every record of a record type.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ProviderError::SchemaMissing`] if the record type was
    /// never provisioned, or any transport error.
    fn fetch_all(&self, record_type: &str) -> ProviderResult<Vec<RemoteRecord>>;

    /// Inserts or updates a record.
    ///
    /// A record with an empty `record_id` is inserted under a new identifier.
    /// Returns the stored record, which always carries its identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be stored.
    fn save(&self, record: RemoteRecord) -> ProviderResult<RemoteRecord>;

    /// Deletes a record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ProviderError::NotFound`] if no record has the
    /// identifier, or any transport error.
    fn delete(&self, remote_id: &RemoteId) -> ProviderResult<()>;
}

impl<P: RemoteProvider + ?Sized> RemoteProvider for Arc<P> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn fetch_all(&self, record_type: &str) -> ProviderResult<Vec<RemoteRecord>> {
        (**self).fetch_all(record_type)
    }

    fn save(&self, record: RemoteRecord) -> ProviderResult<RemoteRecord> {
        (**self).save(record)
    }

    fn delete(&self, remote_id: &RemoteId) -> ProviderResult<()> {
        (**self).delete(remote_id)
    }
}
