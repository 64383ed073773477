//! Edit command implementation.

use crate::commands::add::{check_intensity, normalize_tags};
use crate::error::{CliError, CliResult};
use crate::journal::{find_entry, Journal};
use crate::models::EventEntry;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Fields to change. `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct EntryChanges {
    /// New note; an empty string clears it.
    pub note: Option<String>,
    /// New event time.
    pub occurred_at: Option<DateTime<Utc>>,
    /// Replacement tags.
    pub tags: Option<Vec<String>>,
    /// New intensity.
    pub intensity: Option<i64>,
}

impl EntryChanges {
    fn is_empty(&self) -> bool {
        self.note.is_none()
            && self.occurred_at.is_none()
            && self.tags.is_none()
            && self.intensity.is_none()
    }
}

/// Runs the edit command.
pub fn run(path: &Path, id: &str, changes: EntryChanges) -> CliResult<()> {
    let journal = Journal::open(path)?;
    let mut entries = journal.entries()?;
    let index = find_entry(&entries, id)?;

    apply(&mut entries[index], changes, Utc::now())?;
    journal.save_entries(&entries)?;

    println!("updated {}", entries[index].id);
    Ok(())
}

/// Applies `changes` and bumps the modification time.
pub fn apply(entry: &mut EventEntry, changes: EntryChanges, now: DateTime<Utc>) -> CliResult<()> {
    if changes.is_empty() {
        return Err(CliError::invalid("changes", "nothing to change"));
    }
    check_intensity(changes.intensity)?;

    if let Some(note) = changes.note {
        entry.note = Some(note).filter(|n| !n.trim().is_empty());
    }
    if let Some(occurred_at) = changes.occurred_at {
        entry.occurred_at = occurred_at;
    }
    if let Some(tags) = changes.tags {
        entry.tags = normalize_tags(tags);
    }
    if changes.intensity.is_some() {
        entry.intensity = changes.intensity;
    }
    // Never move the conflict timestamp backwards.
    entry.updated_at = now.max(entry.updated_at);
    Ok(())
}
