//! Unlock command implementation.

use crate::error::{CliError, CliResult};
use crate::journal::Journal;
use crate::models::KeyUnlock;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Runs the unlock command.
pub fn run(path: &Path, key: &str, progress: f64) -> CliResult<()> {
    let journal = Journal::open(path)?;
    let mut unlocks = journal.unlocks()?;

    if apply(&mut unlocks, key, progress, Utc::now())? {
        journal.save_unlocks(&unlocks)?;
        println!("unlocked {key} ({:.0}%)", progress * 100.0);
    } else {
        println!("{key} already unlocked");
    }
    Ok(())
}

/// Records an unlock. Returns false if the key is already unlocked at the
/// same or a higher progress.
pub fn apply(
    unlocks: &mut Vec<KeyUnlock>,
    key: &str,
    progress: f64,
    now: DateTime<Utc>,
) -> CliResult<bool> {
    let key = key.trim();
    if key.is_empty() {
        return Err(CliError::invalid("key", "must not be empty"));
    }
    if !(0.0..=1.0).contains(&progress) {
        return Err(CliError::invalid(
            "progress",
            format!("{progress} is not between 0 and 1"),
        ));
    }

    match unlocks.iter_mut().find(|u| u.key == key) {
        Some(existing) if existing.progress >= progress => Ok(false),
        Some(existing) => {
            existing.progress = progress;
            existing.unlocked_at = now;
            Ok(true)
        }
        None => {
            unlocks.push(KeyUnlock {
                key: key.to_string(),
                progress,
                unlocked_at: now,
            });
            Ok(true)
        }
    }
}
