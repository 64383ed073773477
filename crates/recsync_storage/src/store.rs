//! State store trait definition.

use crate::error::{StorageError, StorageResult};

/// Maximum length of a state key in bytes.
const MAX_KEY_LEN: usize = 128;

/// A durable key/value store for sync bookkeeping.
///
/// Stores are **opaque byte stores**. Each key holds exactly one value which
/// is replaced wholesale by `put`. The sync engine owns all value formats.
///
/// # Invariants
///
/// - `get` returns exactly the bytes passed to the last successful `put`
/// - `put` is atomic with respect to concurrent and subsequent readers
/// - `remove` on a missing key succeeds
/// - Stores must be `Send + Sync` so they can be shared between workers
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent state
pub trait StateStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// Returns `Ok(None)` when nothing has been stored under the key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the value stored under `key`.
    ///
    /// After this returns successfully the value survives process termination
    /// (for durable stores).
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails.
    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Removes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the removal fails.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Lists every stored key in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn keys(&self) -> StorageResult<Vec<String>>;
}

impl<S: StateStore + ?Sized> StateStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        (**self).put(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        (**self).remove(key)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        (**self).keys()
    }
}

/// Checks that a key is usable by every store.
///
/// Keys are limited to ASCII letters, digits, `.`, `_` and `-`, must not be
/// empty, must not start with `.` and are at most 128 bytes long. The same
/// rules apply to in-memory stores so that tests catch keys a file store would
/// reject.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] describing the first violated rule.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let reject = |reason| {
        Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason,
        })
    };

    if key.is_empty() {
        return reject("key is empty");
    }
    if key.len() > MAX_KEY_LEN {
        return reject("key is longer than 128 bytes");
    }
    if key.starts_with('.') {
        return reject("key starts with '.'");
    }
    if !key
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
    {
        return reject("key contains characters outside [A-Za-z0-9._-]");
    }
    Ok(())
}
