//! Sync command implementation.

use crate::commands::OutputFormat;
use crate::error::CliResult;
use crate::journal::{Journal, ENTRIES, UNLOCKS};
use crate::models::{EventEntry, KeyUnlock};
use recsync_engine::{DirectoryProvider, SyncHandle, SyncReport, SyncStatus};
use recsync_protocol::SyncRecord;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Result of syncing both entity types.
#[derive(Debug, Serialize)]
pub struct SyncSummary {
    /// Remote directory.
    pub remote: String,
    /// One report per entity type.
    pub reports: Vec<SyncReport>,
}

/// Runs the sync command.
pub fn run(path: &Path, remote: &Path, format: OutputFormat) -> CliResult<()> {
    let journal = Journal::open(path)?;
    let summary = sync_journal(&journal, remote)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => print_text_output(&summary),
    }
    Ok(())
}

/// Syncs entries and unlocks concurrently and stores the merged records.
pub fn sync_journal(journal: &Journal, remote: &Path) -> CliResult<SyncSummary> {
    let provider = Arc::new(DirectoryProvider::new(remote));
    let entries =
        SyncHandle::spawn(journal.coordinator::<EventEntry, _>(ENTRIES, Arc::clone(&provider))?)?;
    let unlocks = SyncHandle::spawn(journal.coordinator::<KeyUnlock, _>(UNLOCKS, provider)?)?;

    let local_entries = journal.entries()?;
    let local_unlocks = journal.unlocks()?;

    let runtime = tokio::runtime::Runtime::new()?;
    let (entries_outcome, unlocks_outcome) = runtime.block_on(async {
        let outcomes = tokio::join!(
            entries.perform_full_sync(local_entries),
            unlocks.perform_full_sync(local_unlocks),
        );
        tokio::join!(stop_worker(&entries), stop_worker(&unlocks));
        outcomes
    });
    let entries_outcome = entries_outcome?;
    let unlocks_outcome = unlocks_outcome?;

    journal.save_entries(&entries_outcome.records)?;
    journal.save_unlocks(&unlocks_outcome.records)?;

    let reports = vec![entries_outcome.report, unlocks_outcome.report];
    for report in &reports {
        if let Some(partial) = report.status.partial_failure() {
            for failure in &partial.failures {
                tracing::warn!(
                    entity_type = %report.entity_type,
                    local_id = %failure.local_id,
                    error = %failure.error,
                    "upload failed, will retry on next sync"
                );
            }
        }
    }

    Ok(SyncSummary {
        remote: remote.display().to_string(),
        reports,
    })
}

/// Stops a worker, returning false if it had already stopped.
async fn stop_worker<R: SyncRecord>(handle: &SyncHandle<R>) -> bool {
    match handle.shutdown().await {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(
                entity_type = handle.entity_type(),
                error = %e,
                "sync worker already stopped"
            );
            false
        }
    }
}

fn print_text_output(summary: &SyncSummary) {
    println!("Remote: {}", summary.remote);
    for report in &summary.reports {
        let status = match &report.status {
            SyncStatus::Offline => {
                println!("{:<8} offline, nothing changed", report.entity_type);
                continue;
            }
            SyncStatus::Complete => "complete".to_string(),
            SyncStatus::Partial(partial) => format!("partial ({partial})"),
        };
        println!(
            "{:<8} {status}: {} records, {} fetched, {}/{} uploaded, {} deleted, {} conflicts ({} ms)",
            report.entity_type,
            report.merged,
            report.fetched,
            report.uploads_succeeded(),
            report.uploads_attempted,
            report.tombstones_drained,
            report.conflicts.len(),
            report.duration_ms,
        );
        if let Some(error) = &report.fetch_error {
            println!("         remote read failed: {error}");
        }
    }
}
