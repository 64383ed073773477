//! The per-entity-type sync coordinator.

use crate::config::SyncConfig;
use crate::error::{ProviderError, SyncError, SyncResult};
use crate::identity::IdentityMap;
use crate::merge::{self, RemoteCopy, RemoteSet};
use crate::provider::RemoteProvider;
use crate::report::{PartialFailure, SyncOutcome, SyncReport, SyncStatus, UploadFailure};
use crate::state::{LastSync, SyncGuard, SyncState, SyncStats};
use crate::tombstone::TombstoneSet;
use chrono::{DateTime, Utc};
use recsync_protocol::{LocalId, RemoteId, SyncRecord};
use recsync_storage::StateStore;
use serde::Serialize;
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// What `delete_one` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The remote copy was deleted and the mapping removed.
    Deleted(RemoteId),
    /// The record was never uploaded; only local bookkeeping was cleared.
    NotMapped,
    /// The remote could not be reached or refused the delete. The id is
    /// tombstoned and the next full sync will retry.
    Deferred,
}

/// A point-in-time view of a coordinator's bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSnapshot {
    /// Entity type.
    pub entity_type: String,
    /// Current state.
    pub state: SyncState,
    /// Last completed online pass.
    pub last_sync: Option<DateTime<Utc>>,
    /// Mapped records, in local id order.
    pub mapped: Vec<(LocalId, RemoteId)>,
    /// Tombstoned ids.
    pub tombstoned: Vec<LocalId>,
    /// Accumulated statistics.
    pub stats: SyncStats,
}

/// Synchronizes one entity type with a remote provider.
///
/// The coordinator owns the identity map, the tombstone set and the
/// last-sync timestamp of its entity type; nothing else may mutate them. All
/// operations take `&mut self`, so a coordinator has exactly one writer. To
/// share it across tasks, move it onto a worker with
/// [`SyncHandle::spawn`](crate::SyncHandle::spawn).
///
/// # Full sync
///
/// [`perform_full_sync`](Self::perform_full_sync) runs, in order:
///
/// 1. fetch remote records (a failure counts as an empty remote set)
/// 2. drain tombstones by deleting every remote copy of each
/// 3. delete remote copies superseded by a newer copy of the same record
/// 4. merge local and remote records
/// 5. upload every record the merge marked
/// 6. record the pass time and return the merged records, newest first
///
/// Only upload failures reach the caller, as [`SyncStatus::Partial`].
pub struct SyncCoordinator<R, P> {
    config: SyncConfig,
    provider: P,
    identity: IdentityMap,
    tombstones: TombstoneSet,
    last_sync: LastSync,
    syncing: Arc<AtomicBool>,
    stats: SyncStats,
    _record: PhantomData<fn() -> R>,
}

impl<R: SyncRecord, P: RemoteProvider> SyncCoordinator<R, P> {
    /// Creates a coordinator from already loaded bookkeeping.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: SyncConfig,
        provider: P,
        identity: IdentityMap,
        tombstones: TombstoneSet,
        last_sync: LastSync,
    ) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            provider,
            identity,
            tombstones,
            last_sync,
            syncing: Arc::new(AtomicBool::new(false)),
            stats: SyncStats::default(),
            _record: PhantomData,
        })
    }

    /// Loads the bookkeeping for `config.entity_type` from `store` and creates
    /// a coordinator.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the stored state
    /// cannot be read.
    pub fn open(config: SyncConfig, provider: P, store: Arc<dyn StateStore>) -> SyncResult<Self> {
        config.validate()?;
        let keys = config.state_keys();
        let identity = IdentityMap::load(Arc::clone(&store), keys.identity_map)?;
        let tombstones = TombstoneSet::load(Arc::clone(&store), keys.tombstones)?;
        let last_sync = LastSync::load(store, keys.last_sync)?;
        tracing::debug!(
            entity_type = %config.entity_type,
            mapped = identity.len(),
            tombstoned = tombstones.len(),
            "opened sync state"
        );
        Self::new(config, provider, identity, tombstones, last_sync)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the entity type.
    pub fn entity_type(&self) -> &str {
        &self.config.entity_type
    }

    /// Returns the provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Returns the identity map.
    pub fn identity(&self) -> &IdentityMap {
        &self.identity
    }

    /// Returns the tombstone set.
    pub fn tombstones(&self) -> &TombstoneSet {
        &self.tombstones
    }

    /// Returns the time of the last completed online pass.
    pub fn last_sync_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_sync.get()
    }

    /// Returns true while a full sync is running.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Returns the current state.
    pub fn state(&self) -> SyncState {
        if self.is_syncing() {
            SyncState::Syncing
        } else {
            SyncState::Idle
        }
    }

    /// Returns accumulated statistics.
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Returns a copy of the bookkeeping.
    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            entity_type: self.config.entity_type.clone(),
            state: self.state(),
            last_sync: self.last_sync.get(),
            mapped: self
                .identity
                .iter()
                .map(|(l, r)| (l.clone(), r.clone()))
                .collect(),
            tombstoned: self.tombstones.all().into_iter().collect(),
            stats: self.stats.clone(),
        }
    }

    /// Returns the shared `is_syncing` flag.
    pub(crate) fn syncing_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.syncing)
    }

    /// Runs one full sync pass and returns the canonical record set.
    ///
    /// `local_records` is the caller's current snapshot; the returned
    /// records replace it. If the provider is unavailable the snapshot is
    /// returned unchanged with [`SyncStatus::Offline`].
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SyncInProgress`] if a pass is already running.
    /// Every other failure is recovered and described in the report.
    pub fn perform_full_sync(&mut self, local_records: Vec<R>) -> SyncResult<SyncOutcome<R>> {
        let _guard = SyncGuard::acquire(&self.syncing, &self.config.entity_type)?;
        let started = Instant::now();
        let mut report = SyncReport::new(&self.config.entity_type);

        if !self.provider.is_available() {
            tracing::info!(
                entity_type = %self.config.entity_type,
                "remote unavailable, skipping sync"
            );
            report.status = SyncStatus::Offline;
            report.merged = local_records.len();
            report.finish(started.elapsed());
            self.stats.record(&report);
            return Ok(SyncOutcome {
                records: local_records,
                report,
            });
        }

        tracing::debug!(
            entity_type = %self.config.entity_type,
            local = local_records.len(),
            tombstones = self.tombstones.len(),
            "starting full sync"
        );

        let (mut remote, fetched) = self.fetch_remote(&mut report);
        let excluded = self.drain_tombstones(&mut remote, fetched, &mut report);
        self.prune_superseded(&remote, &mut report);
        let plan = merge::merge(
            local_records,
            &remote.copies,
            &excluded,
            self.config.conflict_policy,
        );
        report.conflicts = plan.conflicts;
        report.merged = plan.records.len();

        let failures = self.upload_all(plan.uploads, &mut report);
        if !failures.is_empty() {
            let partial = PartialFailure {
                succeeded: report.uploads_attempted - failures.len(),
                failed: failures.len(),
                failures,
            };
            tracing::warn!(
                entity_type = %self.config.entity_type,
                succeeded = partial.succeeded,
                failed = partial.failed,
                "sync completed with failed uploads"
            );
            report.status = SyncStatus::Partial(partial);
        }

        let result = self.last_sync.set(Utc::now());
        self.absorb("last sync timestamp", result);

        report.finish(started.elapsed());
        self.stats.record(&report);
        tracing::info!(
            entity_type = %self.config.entity_type,
            fetched = report.fetched,
            merged = report.merged,
            uploaded = report.uploads_succeeded(),
            drained = report.tombstones_drained,
            duration_ms = report.duration_ms,
            "sync pass finished"
        );

        Ok(SyncOutcome {
            records: plan.records,
            report,
        })
    }

    /// Fetches and decodes the remote set, refreshing the identity map.
    ///
    /// Returns the collapsed remote set and whether the fetch succeeded.
    fn fetch_remote(&mut self, report: &mut SyncReport) -> (RemoteSet<R>, bool) {
        let fetched = match self.provider.fetch_all(R::RECORD_TYPE) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(
                    entity_type = %self.config.entity_type,
                    error = %e,
                    "remote fetch failed, continuing with an empty remote set"
                );
                report.fetch_error = Some(e.to_string());
                self.stats.last_error = Some(e.to_string());
                return (Default::default(), false);
            }
        };

        let mut copies = Vec::with_capacity(fetched.len());
        for record in fetched {
            let Some(remote_id) = record.remote_id() else {
                report.undecodable += 1;
                continue;
            };
            match R::decode(&record) {
                Ok(decoded) => copies.push(RemoteCopy {
                    record: decoded,
                    remote_id,
                }),
                Err(e) => {
                    tracing::warn!(
                        entity_type = %self.config.entity_type,
                        remote_id = %remote_id,
                        error = %e,
                        "skipping undecodable remote record"
                    );
                    report.undecodable += 1;
                }
            }
        }
        report.fetched = copies.len();

        let remote = merge::collapse_remote(copies);
        for (local_id, copy) in &remote.copies {
            let result = self
                .identity
                .put(local_id.clone(), copy.remote_id.clone());
            self.absorb("identity map", result);
        }
        (remote, true)
    }

    /// Deletes the remote copies of tombstoned records.
    ///
    /// Every fetched copy is deleted, plus the mapped one if the fetch missed
    /// it. A tombstone is only cleared by a pass whose fetch succeeded, since
    /// otherwise copies the coordinator never mapped may remain.
    ///
    /// Returns the ids to keep out of the merge: every id tombstoned when the
    /// pass started.
    fn drain_tombstones(
        &mut self,
        remote: &mut RemoteSet<R>,
        fetched: bool,
        report: &mut SyncReport,
    ) -> BTreeSet<LocalId> {
        let pending = self.tombstones.all();

        for local_id in &pending {
            let mut targets = remote.remote_ids(local_id);
            if let Some(mapped) = self.identity.get(local_id) {
                if !targets.contains(mapped) {
                    targets.push(mapped.clone());
                }
            }
            remote.copies.remove(local_id);
            remote.superseded.remove(local_id);

            for remote_id in &targets {
                self.delete_copy(local_id, remote_id, report);
            }
            if !targets.is_empty() {
                let result = self.identity.remove(local_id).map(|_| ());
                self.absorb("identity map", result);
            }

            if !fetched {
                tracing::debug!(
                    entity_type = %self.config.entity_type,
                    local_id = %local_id,
                    "keeping tombstone until the remote can be read"
                );
                continue;
            }
            let result = self.tombstones.remove(local_id).map(|_| ());
            self.absorb("tombstones", result);
            report.tombstones_drained += 1;
        }

        pending
    }

    fn delete_copy(&mut self, local_id: &LocalId, remote_id: &RemoteId, report: &mut SyncReport) {
        match self.provider.delete(remote_id) {
            Ok(()) => tracing::debug!(
                entity_type = %self.config.entity_type,
                local_id = %local_id,
                remote_id = %remote_id,
                "deleted remote copy"
            ),
            Err(e) => {
                tracing::info!(
                    entity_type = %self.config.entity_type,
                    local_id = %local_id,
                    remote_id = %remote_id,
                    error = %e,
                    "remote delete failed, treating as already deleted"
                );
                report.delete_races += 1;
            }
        }
    }

    /// Deletes remote copies that lost to a newer copy of the same record.
    ///
    /// A failed delete is left for the next pass, which fetches the copy
    /// again.
    fn prune_superseded(&mut self, remote: &RemoteSet<R>, report: &mut SyncReport) {
        for (local_id, remote_ids) in &remote.superseded {
            for remote_id in remote_ids {
                match self.provider.delete(remote_id) {
                    Ok(()) | Err(ProviderError::NotFound { .. }) => {
                        tracing::debug!(
                            entity_type = %self.config.entity_type,
                            local_id = %local_id,
                            remote_id = %remote_id,
                            "removed superseded remote copy"
                        );
                        report.duplicates_removed += 1;
                    }
                    Err(e) => tracing::info!(
                        entity_type = %self.config.entity_type,
                        local_id = %local_id,
                        remote_id = %remote_id,
                        error = %e,
                        "could not remove superseded remote copy"
                    ),
                }
            }
        }
    }

    /// Uploads every record, recording failures without stopping.
    fn upload_all(&mut self, uploads: Vec<R>, report: &mut SyncReport) -> Vec<UploadFailure> {
        let mut failures = Vec::new();
        for record in uploads {
            report.uploads_attempted += 1;
            let local_id = record.local_id();
            if let Err(e) = self.save(&record) {
                tracing::warn!(
                    entity_type = %self.config.entity_type,
                    local_id = %local_id,
                    error = %e,
                    "upload failed"
                );
                failures.push(UploadFailure {
                    local_id,
                    error: e.to_string(),
                });
            }
        }
        failures
    }

    /// Saves one record, reusing its known remote id, and maps the result.
    fn save(&mut self, record: &R) -> SyncResult<RemoteId> {
        let local_id = record.local_id();
        let mut encoded = record.encode();
        if let Some(remote_id) = self.identity.get(&local_id) {
            encoded = encoded.with_id(remote_id);
        }

        let saved = self.provider.save(encoded)?;
        let remote_id = saved.remote_id().ok_or_else(|| {
            ProviderError::Rejected("provider returned a record without an id".into())
        })?;

        let result = self.identity.put(local_id, remote_id.clone());
        self.absorb("identity map", result);
        Ok(remote_id)
    }

    /// Uploads a newly created record.
    ///
    /// If the record is already mapped, nothing is sent and the known remote
    /// id is returned.
    ///
    /// # Errors
    ///
    /// Returns the provider error if the upload fails.
    pub fn upload_one(&mut self, record: &R) -> SyncResult<RemoteId> {
        if let Some(remote_id) = self.identity.get(&record.local_id()) {
            return Ok(remote_id.clone());
        }
        self.check_available()?;
        self.save(record)
    }

    /// Uploads a changed record, updating its remote copy in place if it has
    /// one.
    ///
    /// # Errors
    ///
    /// Returns the provider error if the upload fails.
    pub fn update_one(&mut self, record: &R) -> SyncResult<RemoteId> {
        self.check_available()?;
        self.save(record)
    }

    /// Deletes a record's remote copy and clears its bookkeeping.
    ///
    /// When the remote cannot be reached or the delete fails, the id is
    /// tombstoned instead, so the next full sync finishes the job.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local bookkeeping cannot be written.
    pub fn delete_one(&mut self, local_id: &LocalId) -> SyncResult<DeleteOutcome> {
        let Some(remote_id) = self.identity.get(local_id).cloned() else {
            self.tombstones.remove(local_id)?;
            return Ok(DeleteOutcome::NotMapped);
        };

        let result = if self.provider.is_available() {
            self.provider.delete(&remote_id)
        } else {
            Err(ProviderError::Unavailable)
        };

        match result {
            Ok(()) | Err(ProviderError::NotFound { .. }) => {
                self.identity.remove(local_id)?;
                self.tombstones.remove(local_id)?;
                Ok(DeleteOutcome::Deleted(remote_id))
            }
            Err(e) => {
                tracing::info!(
                    entity_type = %self.config.entity_type,
                    local_id = %local_id,
                    error = %e,
                    "remote delete deferred to next sync"
                );
                self.tombstones.add(local_id.clone())?;
                Ok(DeleteOutcome::Deferred)
            }
        }
    }

    /// Marks a record deleted without contacting the remote.
    ///
    /// # Errors
    ///
    /// Returns an error if the tombstone cannot be written.
    pub fn mark_deleted_locally(&mut self, local_id: LocalId) -> SyncResult<()> {
        tracing::debug!(entity_type = %self.config.entity_type, local_id = %local_id, "tombstoned");
        self.tombstones.add(local_id)
    }

    fn check_available(&self) -> SyncResult<()> {
        if self.provider.is_available() {
            Ok(())
        } else {
            Err(SyncError::Provider(ProviderError::Unavailable))
        }
    }

    /// Logs a bookkeeping write failure during a pass. The pass continues;
    /// the next successful write of the same entry repairs it.
    fn absorb(&mut self, what: &str, result: SyncResult<()>) {
        if let Err(e) = result {
            tracing::warn!(
                entity_type = %self.config.entity_type,
                state = what,
                error = %e,
                "failed to persist sync state"
            );
            self.stats.last_error = Some(e.to_string());
        }
    }
}

impl<R, P: std::fmt::Debug> std::fmt::Debug for SyncCoordinator<R, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("entity_type", &self.config.entity_type)
            .field("provider", &self.provider)
            .field("identity", &self.identity)
            .field("tombstones", &self.tombstones)
            .field("syncing", &self.syncing.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
