//! Schema-versioned record persistence.
//!
//! A [`RecordArchive`] keeps the local copy of one entity type in a
//! [`StateStore`] as a tagged JSON document:
//!
//! ```json
//! {"schema_version": 2, "records": [ ... ]}
//! ```
//!
//! A bare JSON array is an untagged archive and reads as version 0.
//!
//! Migrations are forward-only and registered explicitly, one per source
//! version. Each one rewrites the JSON of a single record from version `n`
//! to `n + 1`. Loading applies every migration between the stored version
//! and the current one, in ascending order.
//!
//! ```ignore
//! let archive = RecordArchive::<Entry>::new(store, "entries.records", 2)
//!     .with_migration(0, |record| Ok(record))
//!     .with_migration(1, add_tags_field);
//!
//! let entries = archive.load()?;
//! archive.save(&entries)?;
//! ```

use crate::error::{SyncError, SyncResult};
use recsync_storage::StateStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Schema version of an archive.
pub type SchemaVersion = u32;

type MigrationFn = Box<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

#[derive(Serialize)]
struct TaggedRef<'a, R> {
    schema_version: SchemaVersion,
    records: &'a [R],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Stored {
    Tagged {
        schema_version: SchemaVersion,
        records: Vec<Value>,
    },
    Legacy(Vec<Value>),
}

/// Versioned JSON persistence for a list of records.
pub struct RecordArchive<R> {
    store: Arc<dyn StateStore>,
    key: String,
    version: SchemaVersion,
    migrations: BTreeMap<SchemaVersion, MigrationFn>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Serialize + DeserializeOwned> RecordArchive<R> {
    /// Creates an archive under `key` that writes schema `version`.
    pub fn new(store: Arc<dyn StateStore>, key: impl Into<String>, version: SchemaVersion) -> Self {
        Self {
            store,
            key: key.into(),
            version,
            migrations: BTreeMap::new(),
            _record: PhantomData,
        }
    }

    /// Registers the migration of one record from `from` to `from + 1`.
    ///
    /// Registering the same source version twice replaces the earlier
    /// migration.
    #[must_use]
    pub fn with_migration<F>(mut self, from: SchemaVersion, migrate: F) -> Self
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.migrations.insert(from, Box::new(migrate));
        self
    }

    /// Returns the schema version written by [`save`](Self::save).
    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    /// Returns the state key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Loads and migrates the stored records. A missing entry is empty.
    ///
    /// The upgraded archive is not written back; the next
    /// [`save`](Self::save) stores it at the current version.
    ///
    /// # Errors
    ///
    /// - [`SyncError::UnsupportedSchemaVersion`] if the stored version is
    ///   newer than the current one
    /// - [`SyncError::MissingMigration`] if a version in between has no
    ///   migration
    /// - [`SyncError::MigrationFailed`] if a migration rejects a record
    /// - [`SyncError::CorruptState`] if the document is not an archive
    pub fn load(&self) -> SyncResult<Vec<R>> {
        let Some(bytes) = self.store.get(&self.key)? else {
            return Ok(Vec::new());
        };

        let stored: Stored = serde_json::from_slice(&bytes).map_err(|e| self.corrupt(e))?;
        let (stored_version, mut records) = match stored {
            Stored::Tagged {
                schema_version,
                records,
            } => (schema_version, records),
            Stored::Legacy(records) => (0, records),
        };

        if stored_version > self.version {
            return Err(SyncError::UnsupportedSchemaVersion {
                found: stored_version,
                supported: self.version,
            });
        }

        for from in stored_version..self.version {
            let migrate = self
                .migrations
                .get(&from)
                .ok_or(SyncError::MissingMigration { from })?;
            records = records
                .into_iter()
                .map(|record| {
                    migrate(record).map_err(|reason| SyncError::MigrationFailed { from, reason })
                })
                .collect::<SyncResult<_>>()?;
            tracing::debug!(key = %self.key, from, to = from + 1, "migrated record archive");
        }

        records
            .into_iter()
            .map(|record| serde_json::from_value(record).map_err(|e| self.corrupt(e)))
            .collect()
    }

    /// Writes `records` at the current schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be serialized or written.
    pub fn save(&self, records: &[R]) -> SyncResult<()> {
        let bytes = serde_json::to_vec(&TaggedRef {
            schema_version: self.version,
            records,
        })?;
        self.store.put(&self.key, &bytes)?;
        Ok(())
    }

    fn corrupt(&self, err: serde_json::Error) -> SyncError {
        SyncError::CorruptState {
            key: self.key.clone(),
            reason: err.to_string(),
        }
    }
}

impl<R> std::fmt::Debug for RecordArchive<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordArchive")
            .field("key", &self.key)
            .field("version", &self.version)
            .field("migrations", &self.migrations.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recsync_storage::InMemoryStore;
    use serde_json::json;

    const KEY: &str = "entries.records";

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        id: String,
        kind: String,
        #[serde(default)]
        tags: Vec<String>,
    }

    fn entry(id: &str, kind: &str) -> Entry {
        Entry {
            id: id.into(),
            kind: kind.into(),
            tags: Vec::new(),
        }
    }

    fn add_tags(mut record: Value) -> Result<Value, String> {
        let object = record.as_object_mut().ok_or("record is not an object")?;
        object.entry("tags").or_insert_with(|| json!(["imported"]));
        Ok(record)
    }

    #[test]
    fn missing_key_is_empty() {
        let archive = RecordArchive::<Entry>::new(Arc::new(InMemoryStore::new()), KEY, 1);
        assert!(archive.load().unwrap().is_empty());
    }

    #[test]
    fn save_writes_current_version() {
        let store = Arc::new(InMemoryStore::new());
        let archive = RecordArchive::<Entry>::new(store.clone(), KEY, 3);
        archive.save(&[entry("1", "run")]).unwrap();

        let raw: Value = serde_json::from_slice(&store.get(KEY).unwrap().unwrap()).unwrap();
        assert_eq!(raw["schema_version"], 3);
        assert_eq!(raw["records"][0]["kind"], "run");

        assert_eq!(archive.load().unwrap(), vec![entry("1", "run")]);
    }

    #[test]
    fn legacy_array_reads_as_version_zero() {
        let legacy = serde_json::to_vec(&json!([{"id": "1", "kind": "run"}])).unwrap();
        let store = Arc::new(InMemoryStore::with_entries([(KEY, legacy)]));

        let archive = RecordArchive::<Entry>::new(store, KEY, 1).with_migration(0, add_tags);
        let loaded = archive.load().unwrap();
        assert_eq!(loaded[0].tags, vec!["imported".to_string()]);
    }

    #[test]
    fn migrations_apply_in_order() {
        let old = serde_json::to_vec(&json!({
            "schema_version": 0,
            "records": [{"id": "1", "kind": "run"}]
        }))
        .unwrap();
        let store = Arc::new(InMemoryStore::with_entries([(KEY, old)]));

        let archive = RecordArchive::<Entry>::new(store, KEY, 2)
            .with_migration(1, |mut record| {
                record["kind"] = json!(format!("{}-v2", record["kind"].as_str().unwrap_or("")));
                Ok(record)
            })
            .with_migration(0, |mut record| {
                record["kind"] = json!(format!("{}-v1", record["kind"].as_str().unwrap_or("")));
                Ok(record)
            });

        assert_eq!(archive.load().unwrap()[0].kind, "run-v1-v2");
    }

    #[test]
    fn newer_version_is_rejected() {
        let future = serde_json::to_vec(&json!({"schema_version": 9, "records": []})).unwrap();
        let store = Arc::new(InMemoryStore::with_entries([(KEY, future)]));
        let archive = RecordArchive::<Entry>::new(store, KEY, 2);

        assert!(matches!(
            archive.load(),
            Err(SyncError::UnsupportedSchemaVersion {
                found: 9,
                supported: 2
            })
        ));
    }

    #[test]
    fn missing_migration_is_rejected() {
        let old = serde_json::to_vec(&json!({"schema_version": 0, "records": []})).unwrap();
        let store = Arc::new(InMemoryStore::with_entries([(KEY, old)]));
        let archive = RecordArchive::<Entry>::new(store, KEY, 2).with_migration(0, Ok);

        assert!(matches!(
            archive.load(),
            Err(SyncError::MissingMigration { from: 1 })
        ));
    }

    #[test]
    fn failed_migration_is_reported() {
        let legacy = serde_json::to_vec(&json!(["not an object"])).unwrap();
        let store = Arc::new(InMemoryStore::with_entries([(KEY, legacy)]));
        let archive = RecordArchive::<Entry>::new(store, KEY, 1).with_migration(0, add_tags);

        assert!(matches!(
            archive.load(),
            Err(SyncError::MigrationFailed { from: 0, .. })
        ));
    }

    #[test]
    fn garbage_is_corrupt_state() {
        let store = Arc::new(InMemoryStore::with_entries([(KEY, b"{\"x\":1}".to_vec())]));
        let archive = RecordArchive::<Entry>::new(store, KEY, 1);
        assert!(matches!(
            archive.load(),
            Err(SyncError::CorruptState { .. })
        ));
    }
}
