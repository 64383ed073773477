//! # recsync Engine
//!
//! Offline-first synchronization of local records with a remote store.
//!
//! This crate provides:
//! - [`RemoteProvider`], the seam to any remote backend, with in-memory and
//!   directory-backed implementations
//! - [`IdentityMap`] and [`TombstoneSet`], the durable bookkeeping of one
//!   entity type
//! - [`SyncCoordinator`], the fetch/drain/merge/upload pass and per-record
//!   operations
//! - [`SyncHandle`], a single-writer worker thread reached through channels
//! - [`RecordArchive`], schema-versioned persistence for local records
//!
//! ## Model
//!
//! The local copy is authoritative for what the user sees. A full sync:
//!
//! 1. Fetches every remote record of the entity type
//! 2. Deletes the remote copies of locally deleted records
//! 3. Merges both sides record by record, newest write winning
//! 4. Uploads local-only records and records whose local copy won
//!
//! ## Key Invariants
//!
//! - A full sync always completes; only upload failures are reported
//! - A tombstoned record never comes back from the remote
//! - A local id maps to at most one remote id
//! - Two passes with no intervening change produce no uploads

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod archive;
mod config;
mod coordinator;
mod error;
mod identity;
pub mod merge;
pub mod provider;
mod report;
mod state;
mod tombstone;
mod worker;

pub use archive::{RecordArchive, SchemaVersion};
pub use config::{StateKeys, SyncConfig, DEFAULT_CHANNEL_CAPACITY};
pub use coordinator::{DeleteOutcome, SyncCoordinator, SyncSnapshot};
pub use error::{ProviderError, ProviderResult, SyncError, SyncResult};
pub use identity::IdentityMap;
pub use provider::{DirectoryProvider, InMemoryProvider, RemoteProvider};
pub use report::{PartialFailure, SyncOutcome, SyncReport, SyncStatus, UploadFailure};
pub use state::{LastSync, SyncState, SyncStats};
pub use tombstone::TombstoneSet;
pub use worker::SyncHandle;
