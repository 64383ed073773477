//! Durable local id → remote id mapping.

use crate::error::{SyncError, SyncResult};
use recsync_protocol::{LocalId, RemoteId};
use recsync_storage::StateStore;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Durable mapping from local record id to remote record id.
///
/// One entry per record that has been uploaded or seen on the remote. The
/// whole map is rewritten to the store after every change, as a JSON object:
///
/// ```json
/// {"entry-1": "6f1c...", "entry-2": "9a02..."}
/// ```
///
/// The in-memory map is updated before the write, so a failed write leaves
/// memory ahead of disk until the next successful write.
pub struct IdentityMap {
    store: Arc<dyn StateStore>,
    key: String,
    entries: BTreeMap<LocalId, RemoteId>,
}

impl IdentityMap {
    /// Loads the map stored under `key`. A missing entry is an empty map.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the stored value is not a JSON
    /// object of strings.
    pub fn load(store: Arc<dyn StateStore>, key: impl Into<String>) -> SyncResult<Self> {
        let key = key.into();
        let entries = match store.get(&key)? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| SyncError::CorruptState {
                key: key.clone(),
                reason: e.to_string(),
            })?,
            None => BTreeMap::new(),
        };
        Ok(Self {
            store,
            key,
            entries,
        })
    }

    /// Returns the remote id mapped to `local_id`.
    pub fn get(&self, local_id: &LocalId) -> Option<&RemoteId> {
        self.entries.get(local_id)
    }

    /// Returns true if `local_id` is mapped.
    pub fn contains(&self, local_id: &LocalId) -> bool {
        self.entries.contains_key(local_id)
    }

    /// Maps `local_id` to `remote_id` and persists the map.
    ///
    /// Nothing is written if the mapping is already present.
    ///
    /// # Errors
    ///
    /// Returns an error if the map cannot be written.
    pub fn put(&mut self, local_id: LocalId, remote_id: RemoteId) -> SyncResult<()> {
        if self.entries.get(&local_id) == Some(&remote_id) {
            return Ok(());
        }
        self.entries.insert(local_id, remote_id);
        self.persist()
    }

    /// Removes the mapping for `local_id` and persists the map.
    ///
    /// # Errors
    ///
    /// Returns an error if the map cannot be written.
    pub fn remove(&mut self, local_id: &LocalId) -> SyncResult<Option<RemoteId>> {
        let removed = self.entries.remove(local_id);
        if removed.is_some() {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Returns the number of mappings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over mappings in local id order.
    pub fn iter(&self) -> impl Iterator<Item = (&LocalId, &RemoteId)> {
        self.entries.iter()
    }

    /// Returns the state key.
    pub fn key(&self) -> &str {
        &self.key
    }

    fn persist(&self) -> SyncResult<()> {
        let bytes = serde_json::to_vec(&self.entries)?;
        self.store.put(&self.key, &bytes)?;
        Ok(())
    }
}

impl std::fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityMap")
            .field("key", &self.key)
            .field("entries", &self.entries)
            .finish()
    }
}
