//! # recsync Protocol
//!
//! Provider-agnostic record types for recsync.
//!
//! This crate provides:
//! - [`TypedValue`] and [`RemoteRecord`], the shape every remote backend stores
//! - [`LocalId`] and [`RemoteId`] identifiers
//! - [`SyncRecord`], the codec trait a domain type implements to be synced
//! - [`ConflictPolicy`] and [`Conflict`] for whole-record conflict resolution
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod error;
mod ids;
mod record;
mod sync_record;
mod value;

pub use conflict::{Conflict, ConflictPolicy, Resolution};
pub use error::{ProtocolError, ProtocolResult};
pub use ids::{LocalId, RemoteId};
pub use record::RemoteRecord;
pub use sync_record::SyncRecord;
pub use value::{TypedValue, ValueKind};
