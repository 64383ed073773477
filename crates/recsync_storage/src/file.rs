//! Directory-backed state store for persistent sync bookkeeping.
//!
//! Layout:
//!
//! ```text
//! <state_dir>/
//! ├─ LOCK              # Advisory lock for single-writer
//! └─ state/
//!    ├─ entries.identity_map
//!    ├─ entries.tombstones
//!    └─ ...
//! ```

use crate::error::{StorageError, StorageResult};
use crate::store::{validate_key, StateStore};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const STATE_DIR: &str = "state";

/// A directory-backed state store.
///
/// Every key is stored in its own file. Writes go to a temporary file which is
/// synced and then renamed over the target, so a crash leaves either the old
/// value or the new one.
///
/// # Thread Safety
///
/// The store holds an exclusive advisory lock on the directory for its whole
/// lifetime: only one `FileStore` (in any process) can own a state directory
/// at a time. Within the process, writes are serialized by an internal mutex.
///
/// # Example
///
/// ```no_run
/// use recsync_storage::{FileStore, StateStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("sync-state")).unwrap();
/// store.put("entries.tombstones", b"[]").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    state_dir: PathBuf,
    write_guard: Mutex<()>,
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a state directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path exists but is not a directory
    /// - Another process holds the lock (returns [`StorageError::Locked`])
    /// - I/O errors occur
    pub fn open(path: &Path) -> StorageResult<Self> {
        if path.exists() && !path.is_dir() {
            return Err(StorageError::InvalidDirectory(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let state_dir = path.join(STATE_DIR);
        fs::create_dir_all(&state_dir)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.display().to_string()));
        }

        tracing::debug!(path = %path.display(), "opened state directory");

        Ok(Self {
            root: path.to_path_buf(),
            state_dir,
            write_guard: Mutex::new(()),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the state directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.state_dir.join(key)
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.state_dir.join(format!(".{key}.tmp"))
    }
}

impl StateStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        match fs::read(self.value_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        let _guard = self.write_guard.lock();

        let temp = self.temp_path(key);
        {
            let mut file = File::create(&temp)?;
            file.write_all(value)?;
            file.sync_all()?;
        }
        fs::rename(&temp, self.value_path(key))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let _guard = self.write_guard.lock();

        match fs::remove_file(self.value_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.state_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if validate_key(&name).is_ok() {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
