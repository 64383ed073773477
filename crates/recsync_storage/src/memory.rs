//! In-memory state store for testing.

use crate::error::{StorageError, StorageResult};
use crate::store::{validate_key, StateStore};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory state store.
///
/// This store keeps every value in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral sync state that doesn't need to survive restarts
///
/// Writes can be switched off with [`InMemoryStore::set_read_only`] to exercise
/// persistence failures.
///
/// # Example
///
/// ```rust
/// use recsync_storage::{InMemoryStore, StateStore};
///
/// let store = InMemoryStore::new();
/// store.put("entries.last_sync", b"\"2024-01-01T00:00:00Z\"").unwrap();
/// assert_eq!(store.keys().unwrap(), vec!["entries.last_sync".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    read_only: AtomicBool,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-existing entries.
    ///
    /// Useful for testing restart and migration scenarios.
    #[must_use]
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<u8>)>,
        K: Into<String>,
    {
        Self {
            entries: RwLock::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
            read_only: AtomicBool::new(false),
        }
    }

    /// Returns a copy of all entries.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.entries.read().clone()
    }

    /// Makes every subsequent `put` and `remove` fail with
    /// [`StorageError::ReadOnly`].
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.read_only.load(Ordering::SeqCst) {
            Err(StorageError::ReadOnly)
        } else {
            Ok(())
        }
    }
}

impl StateStore for InMemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        self.check_writable()?;
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.check_writable()?;
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.keys().unwrap().is_empty());
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn memory_put_replaces_value() {
        let store = InMemoryStore::new();
        store.put("k", b"one").unwrap();
        store.put("k", b"two").unwrap();
        assert_eq!(store.get("k").unwrap().unwrap(), b"two");
    }

    #[test]
    fn memory_remove_missing_is_ok() {
        let store = InMemoryStore::new();
        assert!(store.remove("never-written").is_ok());
    }

    #[test]
    fn memory_keys_sorted() {
        let store = InMemoryStore::new();
        store.put("b", b"2").unwrap();
        store.put("a", b"1").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn memory_read_only_rejects_writes() {
        let store = InMemoryStore::with_entries([("k", b"v".to_vec())]);
        store.set_read_only(true);

        assert!(matches!(store.put("k", b"x"), Err(StorageError::ReadOnly)));
        assert!(matches!(store.remove("k"), Err(StorageError::ReadOnly)));
        assert_eq!(store.get("k").unwrap().unwrap(), b"v");

        store.set_read_only(false);
        store.put("k", b"x").unwrap();
        assert_eq!(store.get("k").unwrap().unwrap(), b"x");
    }

    #[test]
    fn memory_rejects_invalid_key() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.put("a/b", b"v"),
            Err(StorageError::InvalidKey { .. })
        ));
    }

    proptest! {
        #[test]
        fn last_put_wins(values in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..8)) {
            let store = InMemoryStore::new();
            for value in &values {
                store.put("entries.records", value).unwrap();
            }
            prop_assert_eq!(store.get("entries.records").unwrap(), values.last().cloned());
        }
    }
}
