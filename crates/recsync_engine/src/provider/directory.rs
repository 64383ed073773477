//! Remote provider backed by a shared directory.
//!
//! Layout:
//!
//! ```text
//! <root>/
//! ├─ Entry/
//! │  ├─ 6f1c....json
//! │  └─ 9a02....json
//! └─ Unlock/
//!    └─ ...
//! ```
//!
//! One JSON file per record, named after its remote identifier. A record
//! type directory is the "schema": it is created by the first save of that
//! type, and fetching a type before then fails with `SchemaMissing`.

use super::RemoteProvider;
use crate::error::{ProviderError, ProviderResult};
use recsync_protocol::{RemoteId, RemoteRecord};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const RECORD_EXT: &str = "json";

/// A remote store kept in a directory, typically one shared between devices
/// (a network mount or a synced folder).
///
/// The provider is available while the root directory exists. Writes go to a
/// temporary file and are renamed into place.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    root: PathBuf,
}

impl DirectoryProvider {
    /// Creates a provider rooted at `root`. The directory is not created.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the root directory and the directory for a record type.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created or the record
    /// type is not a plain name.
    pub fn provision(&self, record_type: &str) -> ProviderResult<()> {
        fs::create_dir_all(self.type_dir(record_type)?)?;
        Ok(())
    }

    fn type_dir(&self, record_type: &str) -> ProviderResult<PathBuf> {
        check_component("record type", record_type)?;
        Ok(self.root.join(record_type))
    }

    fn record_path(&self, record_type: &str, remote_id: &RemoteId) -> ProviderResult<PathBuf> {
        check_component("remote id", remote_id.as_str())?;
        Ok(self
            .type_dir(record_type)?
            .join(format!("{remote_id}.{RECORD_EXT}")))
    }

    fn check_available(&self) -> ProviderResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(ProviderError::Unavailable)
        }
    }

    fn read_record(path: &Path) -> ProviderResult<Option<RemoteRecord>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            // Deleted by another writer between listing and reading.
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice::<RemoteRecord>(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record file");
                Ok(None)
            }
        }
    }
}

/// Rejects names that would escape the root or collide with temp files.
fn check_component(what: &str, name: &str) -> ProviderResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(ProviderError::Rejected(format!("invalid {what} '{name}'")))
    }
}

impl RemoteProvider for DirectoryProvider {
    fn is_available(&self) -> bool {
        self.root.is_dir()
    }

    fn fetch_all(&self, record_type: &str) -> ProviderResult<Vec<RemoteRecord>> {
        self.check_available()?;
        let dir = self.type_dir(record_type)?;

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ProviderError::SchemaMissing {
                    record_type: record_type.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.starts_with('.') {
                continue;
            }
            let stem = stem.to_string();
            if let Some(mut record) = Self::read_record(&path)? {
                // The file name is authoritative.
                record.record_id = stem;
                record.record_type = record_type.to_string();
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.record_id.cmp(&b.record_id));

        tracing::debug!(record_type, count = records.len(), root = %self.root.display(), "fetched records");
        Ok(records)
    }

    fn save(&self, mut record: RemoteRecord) -> ProviderResult<RemoteRecord> {
        self.check_available()?;

        let remote_id = match record.remote_id() {
            Some(id) => id,
            None => RemoteId::new(Uuid::new_v4().to_string()),
        };
        let path = self.record_path(&record.record_type, &remote_id)?;
        record.record_id = remote_id.as_str().to_string();

        let dir = self.type_dir(&record.record_type)?;
        fs::create_dir_all(&dir)?;

        let bytes = serde_json::to_vec_pretty(&record)
            .map_err(|e| ProviderError::Rejected(e.to_string()))?;
        let temp = dir.join(format!(".{remote_id}.tmp"));
        {
            let mut file = File::create(&temp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &path)?;

        Ok(record)
    }

    fn delete(&self, remote_id: &RemoteId) -> ProviderResult<()> {
        self.check_available()?;
        check_component("remote id", remote_id.as_str())?;

        let file_name = format!("{remote_id}.{RECORD_EXT}");
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match fs::remove_file(entry.path().join(&file_name)) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(ProviderError::NotFound {
            remote_id: remote_id.clone(),
        })
    }
}
