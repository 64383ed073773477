//! Sync state, statistics and the last-sync timestamp.

use crate::error::{SyncError, SyncResult};
use crate::report::SyncReport;
use chrono::{DateTime, Utc};
use recsync_storage::StateStore;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The current state of a coordinator.
///
/// There is no failed state: every pass, including one that could not reach
/// the remote, returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Not syncing.
    Idle,
    /// A full sync is running.
    Syncing,
}

impl SyncState {
    /// Returns true if a sync is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Syncing)
    }

    /// Returns true if a new full sync can start.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle)
    }
}

/// Statistics accumulated over every pass of one coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Full sync passes run, offline ones included.
    pub cycles_completed: u64,
    /// Passes that found the remote unavailable.
    pub offline_cycles: u64,
    /// Successful uploads.
    pub uploads_succeeded: u64,
    /// Failed uploads.
    pub uploads_failed: u64,
    /// Tombstones drained.
    pub tombstones_drained: u64,
    /// Remote deletes that failed during tombstone draining.
    pub delete_races: u64,
    /// Superseded remote copies removed.
    pub duplicates_removed: u64,
    /// Fetches replaced by an empty remote set.
    pub fetch_failures: u64,
    /// Conflicts resolved.
    pub conflicts_encountered: u64,
    /// Message of the last absorbed or surfaced error.
    pub last_error: Option<String>,
}

impl SyncStats {
    /// Folds a pass report into the totals.
    pub fn record(&mut self, report: &SyncReport) {
        self.cycles_completed += 1;
        if !report.was_online() {
            self.offline_cycles += 1;
            return;
        }
        self.uploads_succeeded += report.uploads_succeeded() as u64;
        self.uploads_failed += report.uploads_failed() as u64;
        self.tombstones_drained += report.tombstones_drained as u64;
        self.delete_races += report.delete_races as u64;
        self.duplicates_removed += report.duplicates_removed as u64;
        self.conflicts_encountered += report.conflicts.len() as u64;
        if let Some(error) = &report.fetch_error {
            self.fetch_failures += 1;
            self.last_error = Some(error.clone());
        }
        if let Some(partial) = report.status.partial_failure() {
            self.last_error = partial.failures.last().map(|f| f.error.clone());
        }
    }
}

/// The advisory last-sync timestamp, stored as an RFC 3339 JSON string.
pub struct LastSync {
    store: Arc<dyn StateStore>,
    key: String,
    value: Option<DateTime<Utc>>,
}

impl LastSync {
    /// Loads the timestamp stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the value is not a timestamp.
    pub fn load(store: Arc<dyn StateStore>, key: impl Into<String>) -> SyncResult<Self> {
        let key = key.into();
        let value = match store.get(&key)? {
            Some(bytes) => Some(serde_json::from_slice(&bytes).map_err(|e| {
                SyncError::CorruptState {
                    key: key.clone(),
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };
        Ok(Self { store, key, value })
    }

    /// Returns the timestamp of the last completed online pass.
    pub fn get(&self) -> Option<DateTime<Utc>> {
        self.value
    }

    /// Records a pass completion time.
    ///
    /// # Errors
    ///
    /// Returns an error if the timestamp cannot be written. The in-memory
    /// value is updated regardless.
    pub fn set(&mut self, at: DateTime<Utc>) -> SyncResult<()> {
        self.value = Some(at);
        let bytes = serde_json::to_vec(&at)?;
        self.store.put(&self.key, &bytes)?;
        Ok(())
    }
}

impl std::fmt::Debug for LastSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LastSync")
            .field("key", &self.key)
            .field("value", &self.value)
            .finish()
    }
}

/// Holds the shared `is_syncing` flag for the duration of a pass.
///
/// Cleared on drop, so an early return or a panic mid-pass cannot leave the
/// entity type locked.
pub(crate) struct SyncGuard {
    flag: Arc<AtomicBool>,
}

impl SyncGuard {
    pub(crate) fn acquire(flag: &Arc<AtomicBool>, entity_type: &str) -> SyncResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::SyncInProgress {
                entity_type: entity_type.to_string(),
            })?;
        Ok(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
