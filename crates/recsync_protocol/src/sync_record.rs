//! Codec trait for domain records.

use crate::error::ProtocolResult;
use crate::ids::LocalId;
use crate::record::RemoteRecord;
use chrono::{DateTime, Utc};

/// A domain record that can be synced.
///
/// Implementors describe three things: the record's stable local identity, the
/// timestamp that decides which of two conflicting copies wins, and how the
/// record maps onto a [`RemoteRecord`].
///
/// `decode(encode(r))` must reproduce `r`, and the encoded record must carry
/// the local id so that any device can recover it from a fetched copy.
///
/// # Example
///
/// ```rust
/// use chrono::{DateTime, Utc};
/// use recsync_protocol::{LocalId, ProtocolResult, RemoteRecord, SyncRecord};
///
/// #[derive(Clone)]
/// struct Note {
///     id: String,
///     text: String,
///     edited_at: DateTime<Utc>,
/// }
///
/// impl SyncRecord for Note {
///     const RECORD_TYPE: &'static str = "Note";
///
///     fn local_id(&self) -> LocalId {
///         LocalId::new(self.id.clone())
///     }
///
///     fn conflict_timestamp(&self) -> DateTime<Utc> {
///         self.edited_at
///     }
///
///     fn encode(&self) -> RemoteRecord {
///         RemoteRecord::new(Self::RECORD_TYPE)
///             .with_field("id", self.id.as_str())
///             .with_field("text", self.text.as_str())
///             .with_field("edited_at", self.edited_at)
///     }
///
///     fn decode(record: &RemoteRecord) -> ProtocolResult<Self> {
///         record.expect_type(Self::RECORD_TYPE)?;
///         Ok(Note {
///             id: record.string("id")?.to_string(),
///             text: record.string("text")?.to_string(),
///             edited_at: record.date("edited_at")?,
///         })
///     }
/// }
/// ```
pub trait SyncRecord: Clone + Send + 'static {
    /// Record type used for every record of this kind on the remote.
    const RECORD_TYPE: &'static str;

    /// Returns the stable local identifier.
    fn local_id(&self) -> LocalId;

    /// Returns the timestamp compared during conflict resolution.
    fn conflict_timestamp(&self) -> DateTime<Utc>;

    /// Encodes the record. The result has an empty `record_id`.
    fn encode(&self) -> RemoteRecord;

    /// Decodes a fetched record.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is missing or mistyped, or the
    /// record belongs to another record type.
    fn decode(record: &RemoteRecord) -> ProtocolResult<Self>;
}
