//! Delete command implementation.

use crate::commands::short_id;
use crate::error::CliResult;
use crate::journal::{find_entry, Journal, ENTRIES};
use crate::models::EventEntry;
use recsync_engine::{DeleteOutcome, DirectoryProvider};
use recsync_protocol::SyncRecord;
use std::path::Path;

/// Runs the delete command.
///
/// Without a remote the entry is tombstoned and its remote copy goes on the
/// next sync. With one, the remote copy is deleted now if it can be.
pub fn run(path: &Path, id: &str, remote: Option<&Path>) -> CliResult<()> {
    let journal = Journal::open(path)?;
    let removed = remove_entry(&journal, id)?;

    let id = short_id(&removed.id);
    let Some(remote) = remote else {
        println!("deleted {id}; remote copy goes on next sync");
        return Ok(());
    };

    let mut coordinator =
        journal.coordinator::<EventEntry, _>(ENTRIES, DirectoryProvider::new(remote))?;
    match coordinator.delete_one(&removed.local_id())? {
        DeleteOutcome::Deleted(remote_id) => println!("deleted {id} (remote {remote_id})"),
        DeleteOutcome::NotMapped => println!("deleted {id}; it was never synced"),
        DeleteOutcome::Deferred => println!("deleted {id}; remote copy goes on next sync"),
    }
    Ok(())
}

/// Tombstones the entry matching `id`, then drops it from the journal.
///
/// The tombstone is written first: if dropping the entry fails, the next
/// sync still removes it everywhere.
pub fn remove_entry(journal: &Journal, id: &str) -> CliResult<EventEntry> {
    let mut entries = journal.entries()?;
    let index = find_entry(&entries, id)?;
    journal.tombstone(ENTRIES, entries[index].local_id())?;

    let removed = entries.remove(index);
    journal.save_entries(&entries)?;
    Ok(removed)
}
