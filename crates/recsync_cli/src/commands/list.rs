//! List command implementation.

use crate::commands::{short_id, EntityKind, OutputFormat};
use crate::error::CliResult;
use crate::journal::Journal;
use crate::models::{EventEntry, KeyUnlock};
use std::path::Path;

/// Runs the list command.
pub fn run(path: &Path, kind: EntityKind, format: OutputFormat) -> CliResult<()> {
    let journal = Journal::open(path)?;
    match (kind, format) {
        (EntityKind::Entries, OutputFormat::Json) => {
            println!("{}", serde_json::to_string_pretty(&journal.entries()?)?);
        }
        (EntityKind::Unlocks, OutputFormat::Json) => {
            println!("{}", serde_json::to_string_pretty(&journal.unlocks()?)?);
        }
        (EntityKind::Entries, OutputFormat::Text) => print_entries(&journal.entries()?),
        (EntityKind::Unlocks, OutputFormat::Text) => print_unlocks(&journal.unlocks()?),
    }
    Ok(())
}

fn print_entries(entries: &[EventEntry]) {
    if entries.is_empty() {
        println!("No entries.");
        return;
    }
    for entry in entries {
        let mut line = format!(
            "{}  {}  {}",
            short_id(&entry.id),
            entry.occurred_at.format("%Y-%m-%d %H:%M"),
            entry.kind
        );
        if let Some(intensity) = entry.intensity {
            line.push_str(&format!(" ({intensity}/10)"));
        }
        if !entry.tags.is_empty() {
            line.push_str(&format!(" [{}]", entry.tags.join(", ")));
        }
        if let Some(note) = &entry.note {
            line.push_str(&format!("  {note}"));
        }
        println!("{line}");
    }
}

fn print_unlocks(unlocks: &[KeyUnlock]) {
    if unlocks.is_empty() {
        println!("No unlocks.");
        return;
    }
    for unlock in unlocks {
        println!(
            "{:<24} {:>4.0}%  {}",
            unlock.key,
            unlock.progress * 100.0,
            unlock.unlocked_at.format("%Y-%m-%d %H:%M")
        );
    }
}
