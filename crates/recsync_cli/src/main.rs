//! recsync CLI
//!
//! A local journal of event entries and key unlocks, synced with a shared
//! remote directory.
//!
//! # Commands
//!
//! - `add` - Record an event entry
//! - `unlock` - Record a key unlock
//! - `edit` - Change an entry
//! - `delete` - Delete an entry locally and remotely
//! - `list` - Show entries or unlocks
//! - `sync` - Sync both record types with a remote directory
//! - `inspect` - Show sync bookkeeping

mod commands;
mod error;
mod journal;
mod models;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use commands::{EntityKind, OutputFormat};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Offline-first journal with directory sync.
#[derive(Parser)]
#[command(name = "recsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the journal state directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record an event entry
    Add {
        /// What happened
        kind: String,

        /// Free-form note
        #[arg(short, long)]
        note: Option<String>,

        /// Tag, may be repeated
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Intensity from 1 to 10
        #[arg(short, long)]
        intensity: Option<i64>,

        /// Event time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Record a key unlock
    Unlock {
        /// Key to unlock
        key: String,

        /// Completion from 0.0 to 1.0
        #[arg(long, default_value = "1.0")]
        progress: f64,
    },

    /// Change an entry
    Edit {
        /// Entry id or unique prefix
        id: String,

        /// New note, empty to clear
        #[arg(short, long)]
        note: Option<String>,

        /// New event time (RFC 3339)
        #[arg(long)]
        occurred_at: Option<DateTime<Utc>>,

        /// Replacement tag, may be repeated
        #[arg(short, long = "tag")]
        tags: Option<Vec<String>>,

        /// New intensity from 1 to 10
        #[arg(short, long)]
        intensity: Option<i64>,
    },

    /// Delete an entry
    Delete {
        /// Entry id or unique prefix
        id: String,

        /// Remote directory to delete from now instead of on next sync
        #[arg(short, long)]
        remote: Option<PathBuf>,
    },

    /// Show entries or unlocks
    List {
        /// Which records to show
        #[arg(short, long, value_enum, default_value = "entries")]
        kind: EntityKind,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Sync entries and unlocks with a remote directory
    Sync {
        /// Remote directory shared between devices
        #[arg(short, long)]
        remote: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show identity maps, tombstones and last sync times
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("recsync v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    let path = cli.path.ok_or("Journal path required (--path)")?;

    match cli.command {
        Commands::Add {
            kind,
            note,
            tags,
            intensity,
            at,
        } => commands::add::run(
            &path,
            commands::add::NewEntry {
                kind,
                note,
                tags,
                intensity,
                occurred_at: at,
            },
        )?,
        Commands::Unlock { key, progress } => commands::unlock::run(&path, &key, progress)?,
        Commands::Edit {
            id,
            note,
            occurred_at,
            tags,
            intensity,
        } => commands::edit::run(
            &path,
            &id,
            commands::edit::EntryChanges {
                note,
                occurred_at,
                tags,
                intensity,
            },
        )?,
        Commands::Delete { id, remote } => commands::delete::run(&path, &id, remote.as_deref())?,
        Commands::List { kind, format } => commands::list::run(&path, kind, format)?,
        Commands::Sync { remote, format } => commands::sync::run(&path, &remote, format)?,
        Commands::Inspect { format } => commands::inspect::run(&path, format)?,
        Commands::Version => {}
    }

    Ok(())
}
