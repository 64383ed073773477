//! Typed field values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single field value of a remote record.
///
/// The set of variants is the lowest common denominator of what record-store
/// backends can hold natively. Every backend adapter maps its own value types
/// onto these.
///
/// Serialized with an explicit tag so the stored form survives round trips
/// through backends that do not distinguish integers from doubles:
///
/// ```json
/// {"type": "int", "value": 3}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TypedValue {
    /// UTF-8 text.
    String(String),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Double(f64),
    /// Boolean.
    Bool(bool),
    /// Point in time, UTC.
    Date(DateTime<Utc>),
    /// List of strings.
    StringArray(Vec<String>),
}

/// The kind of a [`TypedValue`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// [`TypedValue::String`]
    String,
    /// [`TypedValue::Int`]
    Int,
    /// [`TypedValue::Double`]
    Double,
    /// [`TypedValue::Bool`]
    Bool,
    /// [`TypedValue::Date`]
    Date,
    /// [`TypedValue::StringArray`]
    StringArray,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::String => "string",
            ValueKind::Int => "int",
            ValueKind::Double => "double",
            ValueKind::Bool => "bool",
            ValueKind::Date => "date",
            ValueKind::StringArray => "string_array",
        };
        f.write_str(name)
    }
}

impl TypedValue {
    /// Returns the kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            TypedValue::String(_) => ValueKind::String,
            TypedValue::Int(_) => ValueKind::Int,
            TypedValue::Double(_) => ValueKind::Double,
            TypedValue::Bool(_) => ValueKind::Bool,
            TypedValue::Date(_) => ValueKind::Date,
            TypedValue::StringArray(_) => ValueKind::StringArray,
        }
    }

    /// Returns the string if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this is an int value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            TypedValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the float if this is a double value.
    ///
    /// Int values widen to double.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            TypedValue::Double(d) => Some(*d),
            TypedValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Returns the boolean if this is a bool value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the date if this is a date value.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            TypedValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the list if this is a string array value.
    pub fn as_string_array(&self) -> Option<&[String]> {
        match self {
            TypedValue::StringArray(items) => Some(items),
            _ => None,
        }
    }
}

impl From<String> for TypedValue {
    fn from(value: String) -> Self {
        TypedValue::String(value)
    }
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        TypedValue::String(value.to_string())
    }
}

impl From<i64> for TypedValue {
    fn from(value: i64) -> Self {
        TypedValue::Int(value)
    }
}

impl From<f64> for TypedValue {
    fn from(value: f64) -> Self {
        TypedValue::Double(value)
    }
}

impl From<bool> for TypedValue {
    fn from(value: bool) -> Self {
        TypedValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for TypedValue {
    fn from(value: DateTime<Utc>) -> Self {
        TypedValue::Date(value)
    }
}

impl From<Vec<String>> for TypedValue {
    fn from(value: Vec<String>) -> Self {
        TypedValue::StringArray(value)
    }
}
