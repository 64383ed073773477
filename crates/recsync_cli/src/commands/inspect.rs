//! Inspect command implementation.

use crate::commands::OutputFormat;
use crate::error::CliResult;
use crate::journal::{Journal, ENTRIES, UNLOCKS};
use chrono::{DateTime, Utc};
use recsync_engine::{IdentityMap, LastSync, StateKeys, TombstoneSet};
use recsync_protocol::{LocalId, RemoteId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Journal inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// State directory.
    pub path: String,
    /// Sync bookkeeping per entity type.
    pub entities: Vec<EntityState>,
}

/// Sync bookkeeping of one entity type.
#[derive(Debug, Serialize)]
pub struct EntityState {
    /// Entity type.
    pub entity_type: String,
    /// Records in the local archive.
    pub records: usize,
    /// Local to remote id mapping.
    pub mapped: BTreeMap<LocalId, RemoteId>,
    /// Ids waiting for their remote delete.
    pub tombstones: Vec<LocalId>,
    /// Last completed online sync.
    pub last_sync: Option<DateTime<Utc>>,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: OutputFormat) -> CliResult<()> {
    let journal = Journal::open(path)?;
    let result = InspectResult {
        path: path.display().to_string(),
        entities: vec![
            entity_state(&journal, ENTRIES, journal.entries()?.len())?,
            entity_state(&journal, UNLOCKS, journal.unlocks()?.len())?,
        ],
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

/// Reads the bookkeeping of `entity_type`.
pub fn entity_state(
    journal: &Journal,
    entity_type: &str,
    records: usize,
) -> CliResult<EntityState> {
    let keys = StateKeys::for_entity(entity_type);
    let identity = IdentityMap::load(journal.store(), keys.identity_map)?;
    let tombstones = TombstoneSet::load(journal.store(), keys.tombstones)?;
    let last_sync = LastSync::load(journal.store(), keys.last_sync)?;

    Ok(EntityState {
        entity_type: entity_type.to_string(),
        records,
        mapped: identity
            .iter()
            .map(|(local, remote)| (local.clone(), remote.clone()))
            .collect(),
        tombstones: tombstones.all().into_iter().collect(),
        last_sync: last_sync.get(),
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Journal: {}", result.path);
    for entity in &result.entities {
        println!();
        println!("=== {} ===", entity.entity_type);
        println!("Records:    {}", entity.records);
        println!("Mapped:     {}", entity.mapped.len());
        println!("Tombstones: {}", entity.tombstones.len());
        match entity.last_sync {
            Some(at) => println!("Last sync:  {}", at.to_rfc3339()),
            None => println!("Last sync:  never"),
        }
        for id in &entity.tombstones {
            println!("  pending delete: {id}");
        }
    }
}
