//! The local journal: archived records and sync bookkeeping in one state
//! directory.

use crate::error::{CliError, CliResult};
use crate::models::{self, EventEntry, KeyUnlock, ENTRY_SCHEMA_VERSION, UNLOCK_SCHEMA_VERSION};
use recsync_engine::{
    RecordArchive, RemoteProvider, StateKeys, SyncConfig, SyncCoordinator, TombstoneSet,
};
use recsync_protocol::{LocalId, SyncRecord};
use recsync_storage::{FileStore, StateStore};
use std::path::Path;
use std::sync::Arc;

/// Entity type of event entries.
pub const ENTRIES: &str = "entries";

/// Entity type of key unlocks.
pub const UNLOCKS: &str = "unlocks";

/// An open state directory.
///
/// Holds the directory lock until dropped.
pub struct Journal {
    store: Arc<dyn StateStore>,
    entries: RecordArchive<EventEntry>,
    unlocks: RecordArchive<KeyUnlock>,
}

impl Journal {
    /// Opens or creates the journal at `path`.
    pub fn open(path: &Path) -> CliResult<Self> {
        Ok(Self::with_store(Arc::new(FileStore::open(path)?)))
    }

    /// Creates a journal over an already open store.
    pub fn with_store(store: Arc<dyn StateStore>) -> Self {
        let entries = RecordArchive::new(
            Arc::clone(&store),
            StateKeys::for_entity(ENTRIES).records,
            ENTRY_SCHEMA_VERSION,
        )
        .with_migration(0, models::entry_v0_to_v1)
        .with_migration(1, models::entry_v1_to_v2);
        let unlocks = RecordArchive::new(
            Arc::clone(&store),
            StateKeys::for_entity(UNLOCKS).records,
            UNLOCK_SCHEMA_VERSION,
        )
        .with_migration(0, models::unlock_v0_to_v1);

        Self {
            store,
            entries,
            unlocks,
        }
    }

    /// Returns the underlying state store.
    pub fn store(&self) -> Arc<dyn StateStore> {
        Arc::clone(&self.store)
    }

    /// Loads every event entry.
    pub fn entries(&self) -> CliResult<Vec<EventEntry>> {
        Ok(self.entries.load()?)
    }

    /// Replaces the stored event entries.
    pub fn save_entries(&self, entries: &[EventEntry]) -> CliResult<()> {
        Ok(self.entries.save(entries)?)
    }

    /// Loads every key unlock.
    pub fn unlocks(&self) -> CliResult<Vec<KeyUnlock>> {
        Ok(self.unlocks.load()?)
    }

    /// Replaces the stored key unlocks.
    pub fn save_unlocks(&self, unlocks: &[KeyUnlock]) -> CliResult<()> {
        Ok(self.unlocks.save(unlocks)?)
    }

    /// Tombstones a record of `entity_type` so the next sync deletes its
    /// remote copy.
    pub fn tombstone(&self, entity_type: &str, local_id: LocalId) -> CliResult<()> {
        let key = StateKeys::for_entity(entity_type).tombstones;
        TombstoneSet::load(self.store(), key)?.add(local_id)?;
        Ok(())
    }

    /// Opens the coordinator of `entity_type` against `provider`.
    pub fn coordinator<R, P>(
        &self,
        entity_type: &str,
        provider: P,
    ) -> CliResult<SyncCoordinator<R, P>>
    where
        R: SyncRecord,
        P: RemoteProvider,
    {
        Ok(SyncCoordinator::open(
            SyncConfig::new(entity_type),
            provider,
            self.store(),
        )?)
    }
}

/// Returns the index of the entry whose id is `id` or starts with it.
pub fn find_entry(entries: &[EventEntry], id: &str) -> CliResult<usize> {
    if let Some(index) = entries.iter().position(|e| e.id == id) {
        return Ok(index);
    }
    let matches: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.id.starts_with(id))
        .map(|(i, _)| i)
        .collect();
    match matches.as_slice() {
        [] => Err(CliError::NotFound(id.to_string())),
        [index] => Ok(*index),
        _ => Err(CliError::Ambiguous {
            prefix: id.to_string(),
            count: matches.len(),
        }),
    }
}
