//! # recsync Storage
//!
//! Durable key/value stores for sync bookkeeping.
//!
//! The sync engine persists a handful of small, independent entries per entity
//! type (identity map, tombstone set, last-sync timestamp, record archive).
//! Stores are **opaque byte stores**: they never interpret the values they hold.
//!
//! ## Design Principles
//!
//! - One value per key, replaced wholesale on every write
//! - Writes are atomic: a reader sees the old value or the new one, never a mix
//! - Must be `Send + Sync` so a store can be shared between entity workers
//! - The engine owns all value formats
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral state
//! - [`FileStore`] - One file per key inside a locked state directory
//!
//! ## Example
//!
//! ```rust
//! use recsync_storage::{InMemoryStore, StateStore};
//!
//! let store = InMemoryStore::new();
//! store.put("entries.tombstones", b"[]").unwrap();
//! assert_eq!(store.get("entries.tombstones").unwrap().as_deref(), Some(&b"[]"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use store::{validate_key, StateStore};
