//! Add command implementation.

use crate::error::{CliError, CliResult};
use crate::journal::Journal;
use crate::models::EventEntry;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Arguments of a new entry.
#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    /// What happened.
    pub kind: String,
    /// Optional note.
    pub note: Option<String>,
    /// Tags.
    pub tags: Vec<String>,
    /// Intensity from 1 to 10.
    pub intensity: Option<i64>,
    /// Event time; now if absent.
    pub occurred_at: Option<DateTime<Utc>>,
}

/// Runs the add command.
pub fn run(path: &Path, new: NewEntry) -> CliResult<()> {
    let journal = Journal::open(path)?;
    let entry = build(new, Utc::now())?;

    let mut entries = journal.entries()?;
    entries.insert(0, entry.clone());
    journal.save_entries(&entries)?;

    tracing::debug!(id = %entry.id, kind = %entry.kind, "added entry");
    println!("{}", entry.id);
    Ok(())
}

/// Validates the arguments and builds the entry.
pub fn build(new: NewEntry, now: DateTime<Utc>) -> CliResult<EventEntry> {
    let kind = new.kind.trim();
    if kind.is_empty() {
        return Err(CliError::invalid("kind", "must not be empty"));
    }
    check_intensity(new.intensity)?;

    let mut entry = EventEntry::new(kind, new.occurred_at.unwrap_or(now), now);
    entry.note = new.note.filter(|n| !n.trim().is_empty());
    entry.tags = normalize_tags(new.tags);
    entry.intensity = new.intensity;
    Ok(entry)
}

pub(crate) fn check_intensity(intensity: Option<i64>) -> CliResult<()> {
    match intensity {
        Some(i) if !(1..=10).contains(&i) => {
            Err(CliError::invalid("intensity", format!("{i} is not between 1 and 10")))
        }
        _ => Ok(()),
    }
}

/// Trims tags and drops empty and repeated ones.
pub(crate) fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}
