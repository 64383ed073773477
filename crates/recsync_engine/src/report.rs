//! Per-pass sync reports.

use crate::error::{SyncError, SyncResult};
use recsync_protocol::{Conflict, LocalId};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// A single upload that failed during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadFailure {
    /// Record whose upload failed.
    pub local_id: LocalId,
    /// Provider error message.
    pub error: String,
}

/// Summary of a pass in which some uploads failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialFailure {
    /// Uploads that succeeded.
    pub succeeded: usize,
    /// Uploads that failed.
    pub failed: usize,
    /// Details of every failed upload, in upload order.
    pub failures: Vec<UploadFailure>,
}

impl PartialFailure {
    /// Total uploads attempted.
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }
}

impl fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} uploads failed", self.failed, self.attempted())
    }
}

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncStatus {
    /// The remote was unavailable; local records were returned unchanged.
    Offline,
    /// Every queued upload succeeded.
    Complete,
    /// Some uploads failed. The pass still completed.
    Partial(PartialFailure),
}

impl SyncStatus {
    /// Returns the partial failure, if any.
    pub fn partial_failure(&self) -> Option<&PartialFailure> {
        match self {
            SyncStatus::Partial(partial) => Some(partial),
            _ => None,
        }
    }
}

/// What happened during one full sync pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    /// Entity type that was synced.
    pub entity_type: String,
    /// Outcome.
    pub status: SyncStatus,
    /// Remote records fetched and decoded.
    pub fetched: usize,
    /// Fetch failure that was replaced by an empty remote set.
    pub fetch_error: Option<String>,
    /// Fetched records skipped because they could not be decoded.
    pub undecodable: usize,
    /// Tombstones removed during the pass.
    pub tombstones_drained: usize,
    /// Remote deletes that failed and were treated as already done.
    pub delete_races: usize,
    /// Remote copies removed because a newer copy of the same record exists.
    pub duplicates_removed: usize,
    /// Uploads attempted.
    pub uploads_attempted: usize,
    /// Conflicts resolved during the merge.
    pub conflicts: Vec<Conflict>,
    /// Records in the merged result.
    pub merged: usize,
    /// Wall-clock duration of the pass, in milliseconds.
    pub duration_ms: u64,
}

impl SyncReport {
    pub(crate) fn new(entity_type: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            status: SyncStatus::Complete,
            fetched: 0,
            fetch_error: None,
            undecodable: 0,
            tombstones_drained: 0,
            delete_races: 0,
            duplicates_removed: 0,
            uploads_attempted: 0,
            conflicts: Vec::new(),
            merged: 0,
            duration_ms: 0,
        }
    }

    pub(crate) fn finish(&mut self, elapsed: Duration) {
        self.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    }

    /// Returns true if the pass ran against the remote.
    pub fn was_online(&self) -> bool {
        self.status != SyncStatus::Offline
    }

    /// Uploads that succeeded.
    pub fn uploads_succeeded(&self) -> usize {
        match &self.status {
            SyncStatus::Partial(partial) => partial.succeeded,
            _ => self.uploads_attempted,
        }
    }

    /// Uploads that failed.
    pub fn uploads_failed(&self) -> usize {
        self.status.partial_failure().map_or(0, |p| p.failed)
    }
}

/// Result of a full sync: the canonical records and what happened.
#[derive(Debug, Clone)]
pub struct SyncOutcome<R> {
    /// Merged records, newest first. Offline passes return the input unchanged.
    pub records: Vec<R>,
    /// Pass report.
    pub report: SyncReport,
}

impl<R> SyncOutcome<R> {
    /// Returns the records, or the partial failure as an error.
    ///
    /// Use this when the caller wants partial failure to be handled like an
    /// error. The records of a partial pass are discarded in that case; read
    /// `records` directly to keep them.
    pub fn into_result(self) -> SyncResult<Vec<R>> {
        match self.report.status {
            SyncStatus::Partial(partial) => Err(SyncError::PartialFailure(partial)),
            _ => Ok(self.records),
        }
    }
}
