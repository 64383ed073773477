//! Journal record types and their archive migrations.

use chrono::{DateTime, Utc};
use recsync_engine::SchemaVersion;
use recsync_protocol::{LocalId, ProtocolResult, RemoteRecord, SyncRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Archive schema version written for event entries.
pub const ENTRY_SCHEMA_VERSION: SchemaVersion = 2;

/// Archive schema version written for key unlocks.
pub const UNLOCK_SCHEMA_VERSION: SchemaVersion = 1;

/// One event in the journal.
///
/// `occurred_at` is the user-editable event time. Conflicts are decided by
/// `updated_at`, which every local change bumps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEntry {
    /// Locally generated identifier.
    pub id: String,
    /// What happened.
    pub kind: String,
    /// Free-form note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Tags, in insertion order.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Intensity from 1 to 10.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<i64>,
    /// When the event happened.
    pub occurred_at: DateTime<Utc>,
    /// When this copy was last changed.
    pub updated_at: DateTime<Utc>,
}

impl EventEntry {
    /// Creates an entry with a fresh id.
    pub fn new(kind: impl Into<String>, occurred_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.into(),
            note: None,
            tags: Vec::new(),
            intensity: None,
            occurred_at,
            updated_at: now,
        }
    }
}

impl SyncRecord for EventEntry {
    const RECORD_TYPE: &'static str = "EventEntry";

    fn local_id(&self) -> LocalId {
        LocalId::new(self.id.clone())
    }

    fn conflict_timestamp(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn encode(&self) -> RemoteRecord {
        RemoteRecord::new(Self::RECORD_TYPE)
            .with_field("id", self.id.as_str())
            .with_field("kind", self.kind.as_str())
            .with_optional_field("note", self.note.clone())
            .with_field("tags", self.tags.clone())
            .with_optional_field("intensity", self.intensity)
            .with_field("occurred_at", self.occurred_at)
            .with_field("updated_at", self.updated_at)
    }

    fn decode(record: &RemoteRecord) -> ProtocolResult<Self> {
        record.expect_type(Self::RECORD_TYPE)?;
        let occurred_at = record.date("occurred_at")?;
        // Copies written before updated_at existed were never edited.
        let updated_at = match record.get("updated_at") {
            Some(_) => record.date("updated_at")?,
            None => occurred_at,
        };
        let intensity = match record.get("intensity") {
            Some(_) => Some(record.int("intensity")?),
            None => None,
        };
        Ok(Self {
            id: record.string("id")?.to_string(),
            kind: record.string("kind")?.to_string(),
            note: record.optional_string("note")?.map(str::to_string),
            tags: record.string_array("tags")?,
            intensity,
            occurred_at,
            updated_at,
        })
    }
}

/// An unlocked key. Unlocking is idempotent per key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyUnlock {
    /// The key, also the record id.
    pub key: String,
    /// Completion from 0.0 to 1.0.
    pub progress: f64,
    /// When the unlock was last recorded.
    pub unlocked_at: DateTime<Utc>,
}

impl SyncRecord for KeyUnlock {
    const RECORD_TYPE: &'static str = "KeyUnlock";

    fn local_id(&self) -> LocalId {
        LocalId::new(self.key.clone())
    }

    fn conflict_timestamp(&self) -> DateTime<Utc> {
        self.unlocked_at
    }

    fn encode(&self) -> RemoteRecord {
        RemoteRecord::new(Self::RECORD_TYPE)
            .with_field("key", self.key.as_str())
            .with_field("progress", self.progress)
            .with_field("unlocked_at", self.unlocked_at)
    }

    fn decode(record: &RemoteRecord) -> ProtocolResult<Self> {
        record.expect_type(Self::RECORD_TYPE)?;
        Ok(Self {
            key: record.string("key")?.to_string(),
            progress: record.double("progress")?,
            unlocked_at: record.date("unlocked_at")?,
        })
    }
}

fn object(record: &mut Value) -> Result<&mut Map<String, Value>, String> {
    record
        .as_object_mut()
        .ok_or_else(|| "record is not a JSON object".to_string())
}

/// Untagged archives stored the event time as `timestamp`.
pub fn entry_v0_to_v1(mut record: Value) -> Result<Value, String> {
    let fields = object(&mut record)?;
    if let Some(at) = fields.remove("timestamp") {
        fields.insert("occurred_at".into(), at);
    }
    if !fields.contains_key("occurred_at") {
        return Err("entry has no event time".into());
    }
    Ok(record)
}

/// Version 2 added tags and the modification time.
pub fn entry_v1_to_v2(mut record: Value) -> Result<Value, String> {
    let fields = object(&mut record)?;
    fields
        .entry("tags")
        .or_insert_with(|| Value::Array(Vec::new()));
    if !fields.contains_key("updated_at") {
        let occurred_at = fields
            .get("occurred_at")
            .cloned()
            .ok_or("entry has no event time")?;
        fields.insert("updated_at".into(), occurred_at);
    }
    Ok(record)
}

/// Untagged unlock archives only held fully completed keys.
pub fn unlock_v0_to_v1(mut record: Value) -> Result<Value, String> {
    object(&mut record)?
        .entry("progress")
        .or_insert_with(|| Value::from(1.0));
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, hour, 0, 0).unwrap()
    }

    #[test]
    fn entry_codec() {
        let mut entry = EventEntry::new("run", at(7), at(8));
        entry.note = Some("5k".into());
        entry.tags = vec!["outdoor".into()];
        entry.intensity = Some(6);

        let encoded = entry.encode();
        assert_eq!(encoded.record_type, "EventEntry");
        assert_eq!(EventEntry::decode(&encoded).unwrap(), entry);
        assert_eq!(entry.conflict_timestamp(), at(8));
    }

    #[test]
    fn entry_without_optionals_decodes() {
        let entry = EventEntry::new("rest", at(7), at(7));
        let encoded = entry.encode();
        assert!(encoded.get("note").is_none());
        assert!(encoded.get("intensity").is_none());
        assert_eq!(EventEntry::decode(&encoded).unwrap(), entry);
    }

    #[test]
    fn entry_missing_updated_at_uses_event_time() {
        let record = RemoteRecord::new("EventEntry")
            .with_field("id", "e1")
            .with_field("kind", "walk")
            .with_field("occurred_at", at(6));

        let entry = EventEntry::decode(&record).unwrap();
        assert_eq!(entry.updated_at, at(6));
        assert!(entry.tags.is_empty());
    }

    #[test]
    fn unlock_codec() {
        let unlock = KeyUnlock {
            key: "early-bird".into(),
            progress: 0.5,
            unlocked_at: at(9),
        };
        assert_eq!(KeyUnlock::decode(&unlock.encode()).unwrap(), unlock);
        assert!(EventEntry::decode(&unlock.encode()).is_err());
    }

    #[test]
    fn entry_migrations() {
        let v0 = json!({"id": "e1", "kind": "run", "timestamp": "2024-03-09T07:00:00Z"});
        let v2 = entry_v1_to_v2(entry_v0_to_v1(v0).unwrap()).unwrap();

        assert_eq!(v2["occurred_at"], "2024-03-09T07:00:00Z");
        assert_eq!(v2["updated_at"], "2024-03-09T07:00:00Z");
        assert_eq!(v2["tags"], json!([]));
        assert!(v2.get("timestamp").is_none());

        let entry: EventEntry = serde_json::from_value(v2).unwrap();
        assert_eq!(entry.occurred_at, at(7));
    }

    #[test]
    fn entry_migration_rejects_missing_time() {
        assert!(entry_v0_to_v1(json!({"id": "e1", "kind": "run"})).is_err());
        assert!(entry_v1_to_v2(json!("e1")).is_err());
    }

    #[test]
    fn unlock_migration_defaults_progress() {
        let v1 = unlock_v0_to_v1(json!({"key": "k", "unlocked_at": "2024-03-09T09:00:00Z"}))
            .unwrap();
        assert_eq!(v1["progress"], 1.0);
    }
}
