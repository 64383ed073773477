//! Error types for record encoding and decoding.

use crate::value::ValueKind;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while converting between domain records and remote records.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// A required field is absent.
    #[error("record is missing field '{field}'")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// A field holds a value of the wrong kind.
    #[error("field '{field}' has type {found}, expected {expected}")]
    WrongType {
        /// Field name.
        field: String,
        /// Kind the decoder wanted.
        expected: ValueKind,
        /// Kind actually stored.
        found: ValueKind,
    },

    /// A field holds a value of the right kind that is still unusable.
    #[error("field '{field}' is invalid: {reason}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The record belongs to a different record type.
    #[error("record type mismatch: expected '{expected}', found '{found}'")]
    RecordTypeMismatch {
        /// Record type the decoder handles.
        expected: String,
        /// Record type on the record.
        found: String,
    },
}

impl ProtocolError {
    /// Creates an invalid value error.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
