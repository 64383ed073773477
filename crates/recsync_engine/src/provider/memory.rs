//! In-memory remote provider with fault injection.

use super::RemoteProvider;
use crate::error::{ProviderError, ProviderResult};
use parking_lot::RwLock;
use recsync_protocol::{RemoteId, RemoteRecord};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

type SaveFault = Box<dyn Fn(&RemoteRecord) -> Option<ProviderError> + Send + Sync>;

/// A remote store held in memory.
///
/// Faults can be injected per call kind, which makes this the provider of
/// choice for tests:
///
/// - [`set_available`](Self::set_available) toggles reachability
/// - [`fail_fetch_with`](Self::fail_fetch_with) makes `fetch_all` fail
/// - [`fail_saves_when`](Self::fail_saves_when) fails selected saves
/// - [`set_fail_deletes`](Self::set_fail_deletes) fails every delete
///
/// Every call is counted, including failed ones.
pub struct InMemoryProvider {
    available: AtomicBool,
    records: RwLock<BTreeMap<RemoteId, RemoteRecord>>,
    next_id: AtomicU64,
    fetch_fault: RwLock<Option<ProviderError>>,
    save_fault: RwLock<Option<SaveFault>>,
    fail_deletes: AtomicBool,
    fetch_calls: AtomicUsize,
    save_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl InMemoryProvider {
    /// Creates an empty, available provider.
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            records: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            fetch_fault: RwLock::new(None),
            save_fault: RwLock::new(None),
            fail_deletes: AtomicBool::new(false),
            fetch_calls: AtomicUsize::new(0),
            save_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }

    /// Sets whether the provider reports itself available.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Makes every `fetch_all` fail with `error`, or clears the fault.
    pub fn fail_fetch_with(&self, error: Option<ProviderError>) {
        *self.fetch_fault.write() = error;
    }

    /// Fails every save for which `fault` returns an error.
    pub fn fail_saves_when<F>(&self, fault: F)
    where
        F: Fn(&RemoteRecord) -> Option<ProviderError> + Send + Sync + 'static,
    {
        *self.save_fault.write() = Some(Box::new(fault));
    }

    /// Removes the save fault.
    pub fn clear_save_fault(&self) {
        *self.save_fault.write() = None;
    }

    /// Sets whether every delete fails.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Stores a record directly, bypassing faults and counters.
    ///
    /// Simulates a write made by another device. Returns the identifier.
    pub fn insert(&self, mut record: RemoteRecord) -> RemoteId {
        let id = match record.remote_id() {
            Some(id) => id,
            None => {
                let id = self.allocate_id();
                record.record_id = id.as_str().to_string();
                id
            }
        };
        self.records.write().insert(id.clone(), record);
        id
    }

    /// Removes a record directly, bypassing faults and counters.
    pub fn remove(&self, remote_id: &RemoteId) -> Option<RemoteRecord> {
        self.records.write().remove(remote_id)
    }

    /// Returns a stored record.
    pub fn get(&self, remote_id: &RemoteId) -> Option<RemoteRecord> {
        self.records.read().get(remote_id).cloned()
    }

    /// Returns every stored record of a record type.
    pub fn records_of(&self, record_type: &str) -> Vec<RemoteRecord> {
        self.records
            .read()
            .values()
            .filter(|r| r.record_type == record_type)
            .cloned()
            .collect()
    }

    /// Returns the number of stored records of every type.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of `fetch_all` calls.
    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Number of `save` calls.
    pub fn save_count(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    /// Number of `delete` calls.
    pub fn delete_count(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Resets every call counter.
    pub fn reset_counters(&self) {
        self.fetch_calls.store(0, Ordering::SeqCst);
        self.save_calls.store(0, Ordering::SeqCst);
        self.delete_calls.store(0, Ordering::SeqCst);
    }

    fn allocate_id(&self) -> RemoteId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        RemoteId::new(format!("mem-{n}"))
    }

    fn check_available(&self) -> ProviderResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(ProviderError::Unavailable)
        }
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryProvider")
            .field("available", &self.is_available())
            .field("records", &self.len())
            .finish_non_exhaustive()
    }
}

impl RemoteProvider for InMemoryProvider {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn fetch_all(&self, record_type: &str) -> ProviderResult<Vec<RemoteRecord>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if let Some(error) = self.fetch_fault.read().clone() {
            return Err(error);
        }
        Ok(self.records_of(record_type))
    }

    fn save(&self, mut record: RemoteRecord) -> ProviderResult<RemoteRecord> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if let Some(fault) = self.save_fault.read().as_ref() {
            if let Some(error) = fault(&record) {
                return Err(error);
            }
        }

        let id = match record.remote_id() {
            Some(id) => id,
            None => self.allocate_id(),
        };
        record.record_id = id.as_str().to_string();
        self.records.write().insert(id, record.clone());
        Ok(record)
    }

    fn delete(&self, remote_id: &RemoteId) -> ProviderResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ProviderError::transport_retryable("injected delete failure"));
        }
        match self.records.write().remove(remote_id) {
            Some(_) => Ok(()),
            None => Err(ProviderError::NotFound {
                remote_id: remote_id.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: i64) -> RemoteRecord {
        RemoteRecord::new("Entry").with_field("n", n)
    }

    #[test]
    fn memory_save_assigns_ids() {
        let provider = InMemoryProvider::new();
        let a = provider.save(entry(1)).unwrap();
        let b = provider.save(entry(2)).unwrap();

        assert!(a.is_assigned());
        assert_ne!(a.record_id, b.record_id);
        assert_eq!(provider.len(), 2);
        assert_eq!(provider.save_count(), 2);
    }

    #[test]
    fn memory_save_with_id_updates_in_place() {
        let provider = InMemoryProvider::new();
        let saved = provider.save(entry(1)).unwrap();
        let id = saved.remote_id().unwrap();

        provider.save(entry(5).with_id(&id)).unwrap();
        assert_eq!(provider.len(), 1);
        assert_eq!(provider.get(&id).unwrap().int("n").unwrap(), 5);
    }

    #[test]
    fn memory_fetch_filters_by_type() {
        let provider = InMemoryProvider::new();
        provider.insert(entry(1));
        provider.insert(RemoteRecord::new("Unlock"));

        assert_eq!(provider.fetch_all("Entry").unwrap().len(), 1);
        assert_eq!(provider.fetch_all("Unlock").unwrap().len(), 1);
        assert_eq!(provider.fetch_count(), 2);
    }

    #[test]
    fn memory_unavailable_fails_every_call() {
        let provider = InMemoryProvider::new();
        provider.set_available(false);

        assert_eq!(provider.fetch_all("Entry"), Err(ProviderError::Unavailable));
        assert_eq!(provider.save(entry(1)), Err(ProviderError::Unavailable));
        assert_eq!(
            provider.delete(&RemoteId::from("x")),
            Err(ProviderError::Unavailable)
        );
    }

    #[test]
    fn memory_injected_faults() {
        let provider = InMemoryProvider::new();
        provider.fail_fetch_with(Some(ProviderError::SchemaMissing {
            record_type: "Entry".into(),
        }));
        assert!(provider.fetch_all("Entry").is_err());
        provider.fail_fetch_with(None);
        assert!(provider.fetch_all("Entry").is_ok());

        provider.fail_saves_when(|r| {
            (r.int("n").ok() == Some(2)).then(|| ProviderError::Rejected("no twos".into()))
        });
        assert!(provider.save(entry(1)).is_ok());
        assert!(provider.save(entry(2)).is_err());
        provider.clear_save_fault();
        assert!(provider.save(entry(2)).is_ok());

        let id = provider.insert(entry(3));
        provider.set_fail_deletes(true);
        assert!(provider.delete(&id).is_err());
        assert!(provider.get(&id).is_some());
    }

    #[test]
    fn memory_delete_unknown_is_not_found() {
        let provider = InMemoryProvider::new();
        let id = RemoteId::from("missing");
        assert_eq!(
            provider.delete(&id),
            Err(ProviderError::NotFound { remote_id: id })
        );
    }
}
