//! Durable set of locally deleted record ids.

use crate::error::{SyncError, SyncResult};
use recsync_protocol::LocalId;
use recsync_storage::StateStore;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Durable set of local ids deleted locally but not yet confirmed on the
/// remote.
///
/// Stored as a JSON array of strings, rewritten after every change.
pub struct TombstoneSet {
    store: Arc<dyn StateStore>,
    key: String,
    ids: BTreeSet<LocalId>,
}

impl TombstoneSet {
    /// Loads the set stored under `key`. A missing entry is an empty set.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the stored value is not a JSON
    /// array of strings.
    pub fn load(store: Arc<dyn StateStore>, key: impl Into<String>) -> SyncResult<Self> {
        let key = key.into();
        let ids = match store.get(&key)? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| SyncError::CorruptState {
                key: key.clone(),
                reason: e.to_string(),
            })?,
            None => BTreeSet::new(),
        };
        Ok(Self { store, key, ids })
    }

    /// Adds a tombstone and persists the set.
    ///
    /// # Errors
    ///
    /// Returns an error if the set cannot be written.
    pub fn add(&mut self, local_id: LocalId) -> SyncResult<()> {
        if self.ids.insert(local_id) {
            self.persist()?;
        }
        Ok(())
    }

    /// Removes a tombstone and persists the set. Returns true if it was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the set cannot be written.
    pub fn remove(&mut self, local_id: &LocalId) -> SyncResult<bool> {
        let removed = self.ids.remove(local_id);
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Returns true if `local_id` is tombstoned.
    pub fn contains(&self, local_id: &LocalId) -> bool {
        self.ids.contains(local_id)
    }

    /// Returns a copy of every tombstoned id.
    pub fn all(&self) -> BTreeSet<LocalId> {
        self.ids.clone()
    }

    /// Returns the number of tombstones.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if there are no tombstones.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns the state key.
    pub fn key(&self) -> &str {
        &self.key
    }

    fn persist(&self) -> SyncResult<()> {
        let bytes = serde_json::to_vec(&self.ids)?;
        self.store.put(&self.key, &bytes)?;
        Ok(())
    }
}

impl std::fmt::Debug for TombstoneSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TombstoneSet")
            .field("key", &self.key)
            .field("ids", &self.ids)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recsync_storage::InMemoryStore;

    const KEY: &str = "entries.tombstones";

    #[test]
    fn add_remove_persist() {
        let store = Arc::new(InMemoryStore::new());
        let mut set = TombstoneSet::load(store.clone(), KEY).unwrap();

        set.add(LocalId::from("b")).unwrap();
        set.add(LocalId::from("a")).unwrap();
        set.add(LocalId::from("a")).unwrap();
        assert_eq!(set.len(), 2);

        let stored = store.get(KEY).unwrap().unwrap();
        assert_eq!(stored, b"[\"a\",\"b\"]");

        assert!(set.remove(&LocalId::from("a")).unwrap());
        assert!(!set.remove(&LocalId::from("a")).unwrap());

        let reloaded = TombstoneSet::load(store, KEY).unwrap();
        assert_eq!(reloaded.all(), BTreeSet::from([LocalId::from("b")]));
    }

    #[test]
    fn all_is_a_snapshot() {
        let store = Arc::new(InMemoryStore::new());
        let mut set = TombstoneSet::load(store, KEY).unwrap();
        set.add(LocalId::from("1")).unwrap();

        let snapshot = set.all();
        set.remove(&LocalId::from("1")).unwrap();
        assert!(snapshot.contains(&LocalId::from("1")));
        assert!(set.is_empty());
    }

    #[test]
    fn corrupt_state_is_reported() {
        let store = Arc::new(InMemoryStore::with_entries([(KEY, b"{}".to_vec())]));
        assert!(matches!(
            TombstoneSet::load(store, KEY),
            Err(SyncError::CorruptState { .. })
        ));
    }
}
