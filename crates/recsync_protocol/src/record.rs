//! The provider-agnostic remote record.

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::RemoteId;
use crate::value::{TypedValue, ValueKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A record as stored by a remote backend.
///
/// `record_id` is empty until the backend assigns one on first save. Fields
/// are kept in a sorted map so that encoded records are byte-stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Record type, shared by every record of one entity type.
    pub record_type: String,
    /// Backend-assigned identifier, empty if not yet assigned.
    #[serde(default)]
    pub record_id: String,
    /// Field values.
    #[serde(default)]
    pub fields: BTreeMap<String, TypedValue>,
}

impl RemoteRecord {
    /// Creates an unassigned record with no fields.
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            record_id: String::new(),
            fields: BTreeMap::new(),
        }
    }

    /// Sets the remote identifier.
    #[must_use]
    pub fn with_id(mut self, id: &RemoteId) -> Self {
        self.record_id = id.as_str().to_string();
        self
    }

    /// Adds a field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<TypedValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Adds a field only when a value is present.
    #[must_use]
    pub fn with_optional_field<V: Into<TypedValue>>(
        mut self,
        name: impl Into<String>,
        value: Option<V>,
    ) -> Self {
        if let Some(value) = value {
            self.fields.insert(name.into(), value.into());
        }
        self
    }

    /// Returns the remote identifier, if one has been assigned.
    pub fn remote_id(&self) -> Option<RemoteId> {
        if self.record_id.is_empty() {
            None
        } else {
            Some(RemoteId::new(self.record_id.clone()))
        }
    }

    /// Returns true if the backend has assigned an identifier.
    pub fn is_assigned(&self) -> bool {
        !self.record_id.is_empty()
    }

    /// Returns a field value.
    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        self.fields.get(name)
    }

    /// Fails unless this record has the given record type.
    pub fn expect_type(&self, record_type: &str) -> ProtocolResult<()> {
        if self.record_type == record_type {
            Ok(())
        } else {
            Err(ProtocolError::RecordTypeMismatch {
                expected: record_type.to_string(),
                found: self.record_type.clone(),
            })
        }
    }

    fn require(&self, name: &str) -> ProtocolResult<&TypedValue> {
        self.fields.get(name).ok_or_else(|| ProtocolError::MissingField {
            field: name.to_string(),
        })
    }

    fn typed<'a, T>(
        &'a self,
        name: &str,
        expected: ValueKind,
        extract: impl FnOnce(&'a TypedValue) -> Option<T>,
    ) -> ProtocolResult<T> {
        let value = self.require(name)?;
        extract(value).ok_or_else(|| ProtocolError::WrongType {
            field: name.to_string(),
            expected,
            found: value.kind(),
        })
    }

    /// Reads a required string field.
    pub fn string(&self, name: &str) -> ProtocolResult<&str> {
        self.typed(name, ValueKind::String, TypedValue::as_str)
    }

    /// Reads an optional string field.
    ///
    /// A field of another type is still an error.
    pub fn optional_string(&self, name: &str) -> ProtocolResult<Option<&str>> {
        match self.fields.get(name) {
            None => Ok(None),
            Some(_) => self.string(name).map(Some),
        }
    }

    /// Reads a required int field.
    pub fn int(&self, name: &str) -> ProtocolResult<i64> {
        self.typed(name, ValueKind::Int, TypedValue::as_int)
    }

    /// Reads a required double field. Int values widen.
    pub fn double(&self, name: &str) -> ProtocolResult<f64> {
        self.typed(name, ValueKind::Double, TypedValue::as_double)
    }

    /// Reads a required bool field.
    pub fn bool(&self, name: &str) -> ProtocolResult<bool> {
        self.typed(name, ValueKind::Bool, TypedValue::as_bool)
    }

    /// Reads a required date field.
    pub fn date(&self, name: &str) -> ProtocolResult<DateTime<Utc>> {
        self.typed(name, ValueKind::Date, TypedValue::as_date)
    }

    /// Reads a string array field, treating a missing field as empty.
    pub fn string_array(&self, name: &str) -> ProtocolResult<Vec<String>> {
        match self.fields.get(name) {
            None => Ok(Vec::new()),
            Some(_) => self.typed(name, ValueKind::StringArray, |v| {
                v.as_string_array().map(<[String]>::to_vec)
            }),
        }
    }
}
