//! CLI command implementations.

pub mod add;
pub mod delete;
pub mod edit;
pub mod inspect;
pub mod list;
pub mod sync;
pub mod unlock;

use clap::ValueEnum;

/// Output format of reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// The record collections of a journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EntityKind {
    /// Event entries.
    Entries,
    /// Key unlocks.
    Unlocks,
}

/// Shortens an id for text output.
pub(crate) fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
