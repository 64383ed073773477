//! End-to-end tests for the sync engine.

use chrono::{DateTime, TimeZone, Utc};
use recsync_engine::{
    DeleteOutcome, DirectoryProvider, InMemoryProvider, ProviderError, ProviderResult,
    RemoteProvider, SyncConfig, SyncCoordinator, SyncError, SyncHandle, SyncStatus,
};
use recsync_protocol::{LocalId, ProtocolResult, RemoteId, RemoteRecord, SyncRecord};
use recsync_storage::{FileStore, InMemoryStore, StateStore};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    id: String,
    body: String,
    ts: i64,
}

impl SyncRecord for Entry {
    const RECORD_TYPE: &'static str = "Entry";

    fn local_id(&self) -> LocalId {
        LocalId::new(self.id.clone())
    }

    fn conflict_timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.ts, 0).unwrap()
    }

    fn encode(&self) -> RemoteRecord {
        RemoteRecord::new(Self::RECORD_TYPE)
            .with_field("id", self.id.as_str())
            .with_field("body", self.body.as_str())
            .with_field("ts", self.ts)
    }

    fn decode(record: &RemoteRecord) -> ProtocolResult<Self> {
        record.expect_type(Self::RECORD_TYPE)?;
        Ok(Entry {
            id: record.string("id")?.to_string(),
            body: record.string("body")?.to_string(),
            ts: record.int("ts")?,
        })
    }
}

fn entry(id: &str, ts: i64) -> Entry {
    Entry {
        id: id.into(),
        body: format!("body of {id}"),
        ts,
    }
}

fn ids(records: &[Entry]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

type MemCoordinator = SyncCoordinator<Entry, Arc<InMemoryProvider>>;

fn setup() -> (MemCoordinator, Arc<InMemoryProvider>) {
    let provider = Arc::new(InMemoryProvider::new());
    let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
    let coordinator =
        SyncCoordinator::open(SyncConfig::new("entries"), Arc::clone(&provider), store).unwrap();
    (coordinator, provider)
}

// ============================================================================
// Full sync
// ============================================================================

#[test]
fn merge_scenario_keeps_newest_and_uploads_local_changes() {
    let (mut coordinator, provider) = setup();
    let remote_a = provider.insert(entry("1", 7).encode());
    provider.insert(entry("3", 1).encode());

    let outcome = coordinator
        .perform_full_sync(vec![entry("1", 10), entry("2", 5)])
        .unwrap();

    assert_eq!(ids(&outcome.records), vec!["1", "2", "3"]);
    assert_eq!(outcome.records[0].ts, 10);
    assert_eq!(outcome.report.uploads_attempted, 2);
    assert_eq!(outcome.report.status, SyncStatus::Complete);
    assert_eq!(outcome.report.conflicts.len(), 1);

    // "1" was updated in place, "2" was created.
    assert_eq!(provider.len(), 3);
    let stored = provider.get(&remote_a).unwrap();
    assert_eq!(stored.int("ts").unwrap(), 10);
    assert_eq!(coordinator.identity().len(), 3);
}

#[test]
fn second_sync_is_idempotent() {
    let (mut coordinator, provider) = setup();
    provider.insert(entry("r", 3).encode());

    let first = coordinator
        .perform_full_sync(vec![entry("a", 1), entry("b", 2)])
        .unwrap();
    provider.reset_counters();

    let second = coordinator.perform_full_sync(first.records.clone()).unwrap();

    assert_eq!(second.records, first.records);
    assert_eq!(second.report.uploads_attempted, 0);
    assert!(second.report.conflicts.is_empty());
    assert_eq!(provider.save_count(), 0);
    assert_eq!(provider.delete_count(), 0);
}

#[test]
fn equal_timestamps_favor_remote() {
    let (mut coordinator, provider) = setup();
    let mut remote = entry("a", 7);
    remote.body = "remote edit".into();
    provider.insert(remote.encode());

    let mut local = entry("a", 7);
    local.body = "local edit".into();
    let outcome = coordinator.perform_full_sync(vec![local]).unwrap();

    assert_eq!(outcome.records, vec![remote]);
    assert_eq!(outcome.report.uploads_attempted, 0);
}

#[test]
fn newer_remote_replaces_local_copy() {
    let (mut coordinator, provider) = setup();
    let mut remote = entry("a", 9);
    remote.body = "from another device".into();
    provider.insert(remote.encode());

    let outcome = coordinator.perform_full_sync(vec![entry("a", 4)]).unwrap();

    assert_eq!(outcome.records, vec![remote]);
    assert_eq!(provider.save_count(), 0);
}

#[test]
fn failed_uploads_are_all_attempted_and_reported() {
    let (mut coordinator, provider) = setup();
    provider.fail_saves_when(|record| {
        let id = record.string("id").ok()?;
        ["b", "c", "d"]
            .contains(&id)
            .then(|| ProviderError::Rejected("quota exceeded".into()))
    });

    let local: Vec<Entry> = ["a", "b", "c", "d", "e"]
        .iter()
        .enumerate()
        .map(|(i, id)| entry(id, i as i64))
        .collect();
    let outcome = coordinator.perform_full_sync(local).unwrap();

    assert_eq!(provider.save_count(), 5);
    assert_eq!(outcome.records.len(), 5);
    assert_eq!(coordinator.identity().len(), 2);

    let partial = outcome.report.status.partial_failure().unwrap().clone();
    assert_eq!((partial.succeeded, partial.failed), (2, 3));
    let failed: Vec<&str> = partial.failures.iter().map(|f| f.local_id.as_str()).collect();
    assert_eq!(failed, vec!["b", "c", "d"]);

    match outcome.into_result() {
        Err(SyncError::PartialFailure(p)) => assert_eq!(p, partial),
        other => panic!("expected partial failure, got {other:?}"),
    }

    // The failed records are retried by the next pass.
    provider.clear_save_fault();
    provider.reset_counters();
    let retry = coordinator
        .perform_full_sync(vec![entry("b", 1), entry("c", 2), entry("d", 3)])
        .unwrap();
    assert_eq!(retry.report.status, SyncStatus::Complete);
    assert_eq!(provider.save_count(), 3);
    assert_eq!(coordinator.identity().len(), 5);
}

#[test]
fn failed_fetch_bootstraps_from_local_records() {
    let (mut coordinator, provider) = setup();
    provider.fail_fetch_with(Some(ProviderError::SchemaMissing {
        record_type: "Entry".into(),
    }));

    let outcome = coordinator
        .perform_full_sync(vec![entry("a", 1), entry("b", 2)])
        .unwrap();

    assert_eq!(ids(&outcome.records), vec!["b", "a"]);
    assert_eq!(outcome.report.status, SyncStatus::Complete);
    assert!(outcome.report.fetch_error.is_some());
    assert_eq!(provider.len(), 2);
    assert!(coordinator.last_sync_timestamp().is_some());
    assert_eq!(coordinator.stats().fetch_failures, 1);
}

#[test]
fn offline_pass_changes_nothing() {
    let (mut coordinator, provider) = setup();
    provider.set_available(false);
    coordinator.mark_deleted_locally(LocalId::from("x")).unwrap();

    let input = vec![entry("a", 1)];
    let outcome = coordinator.perform_full_sync(input.clone()).unwrap();

    assert_eq!(outcome.records, input);
    assert_eq!(outcome.report.status, SyncStatus::Offline);
    assert_eq!(provider.fetch_count(), 0);
    assert!(coordinator.tombstones().contains(&LocalId::from("x")));
    assert!(coordinator.last_sync_timestamp().is_none());
}

// ============================================================================
// Deletes and tombstones
// ============================================================================

#[test]
fn offline_delete_is_drained_on_next_sync() {
    let (mut coordinator, provider) = setup();
    coordinator
        .perform_full_sync(vec![entry("1", 1), entry("2", 2)])
        .unwrap();
    assert_eq!(provider.len(), 2);

    provider.set_available(false);
    assert_eq!(
        coordinator.delete_one(&LocalId::from("2")).unwrap(),
        DeleteOutcome::Deferred
    );
    provider.set_available(true);

    let outcome = coordinator.perform_full_sync(vec![entry("1", 1)]).unwrap();

    assert_eq!(ids(&outcome.records), vec!["1"]);
    assert!(!coordinator.identity().contains(&LocalId::from("2")));
    assert!(coordinator.tombstones().is_empty());
    assert_eq!(provider.len(), 1);
    assert_eq!(outcome.report.tombstones_drained, 1);
}

#[test]
fn tombstone_of_unmapped_remote_record_is_drained() {
    let (mut coordinator, provider) = setup();
    provider.insert(entry("2", 5).encode());
    coordinator.mark_deleted_locally(LocalId::from("2")).unwrap();

    let outcome = coordinator.perform_full_sync(Vec::new()).unwrap();

    assert!(outcome.records.is_empty());
    assert!(provider.is_empty());
    assert!(coordinator.identity().is_empty());
    assert!(coordinator.tombstones().is_empty());
}

#[test]
fn tombstoned_record_never_returns_even_when_delete_fails() {
    let (mut coordinator, provider) = setup();
    coordinator.perform_full_sync(vec![entry("a", 1)]).unwrap();
    provider.set_fail_deletes(true);
    coordinator.mark_deleted_locally(LocalId::from("a")).unwrap();

    // A stale caller snapshot still holds the record.
    let outcome = coordinator.perform_full_sync(vec![entry("a", 1)]).unwrap();

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.report.delete_races, 1);
    assert_eq!(outcome.report.status, SyncStatus::Complete);
    assert!(coordinator.tombstones().is_empty());
    assert!(!coordinator.identity().contains(&LocalId::from("a")));
}

#[test]
fn delete_removes_every_remote_copy() {
    let (mut coordinator, provider) = setup();
    provider.insert(entry("a", 1).encode());
    provider.insert(entry("a", 1).encode());

    let first = coordinator.perform_full_sync(Vec::new()).unwrap();
    assert_eq!(ids(&first.records), vec!["a"]);

    coordinator.mark_deleted_locally(LocalId::from("a")).unwrap();
    let deleted = coordinator.perform_full_sync(first.records).unwrap();
    assert!(deleted.records.is_empty());
    assert!(provider.is_empty());
    assert!(coordinator.tombstones().is_empty());

    let next = coordinator.perform_full_sync(deleted.records).unwrap();
    assert!(next.records.is_empty());
}

#[test]
fn tombstone_drains_copies_that_were_never_mapped() {
    let (mut coordinator, provider) = setup();
    let mut older = entry("a", 1);
    older.body = "first device".into();
    provider.insert(older.encode());
    provider.insert(entry("a", 2).encode());
    coordinator.mark_deleted_locally(LocalId::from("a")).unwrap();

    let outcome = coordinator.perform_full_sync(Vec::new()).unwrap();

    assert!(outcome.records.is_empty());
    assert!(provider.is_empty());
    assert_eq!(provider.delete_count(), 2);
    assert_eq!(outcome.report.tombstones_drained, 1);
}

#[test]
fn superseded_remote_copies_are_removed() {
    let (mut coordinator, provider) = setup();
    provider.insert(entry("a", 1).encode());
    let newest = provider.insert(entry("a", 4).encode());

    let outcome = coordinator.perform_full_sync(vec![entry("b", 2)]).unwrap();

    assert_eq!(ids(&outcome.records), vec!["a", "b"]);
    assert_eq!(outcome.report.duplicates_removed, 1);
    assert_eq!(coordinator.stats().duplicates_removed, 1);
    assert_eq!(provider.len(), 2);
    assert!(provider.get(&newest).is_some());
    assert_eq!(coordinator.identity().get(&LocalId::from("a")), Some(&newest));

    provider.reset_counters();
    coordinator.perform_full_sync(outcome.records).unwrap();
    assert_eq!(provider.delete_count(), 0);
}

#[test]
fn tombstone_waits_for_a_readable_remote() {
    let (mut coordinator, provider) = setup();
    coordinator.perform_full_sync(vec![entry("a", 1)]).unwrap();
    // A second device uploaded its own copy, which this one has never seen.
    provider.insert(entry("a", 1).encode());
    coordinator.mark_deleted_locally(LocalId::from("a")).unwrap();
    provider.fail_fetch_with(Some(ProviderError::transport_retryable("timeout")));

    let blind = coordinator.perform_full_sync(Vec::new()).unwrap();
    assert!(blind.records.is_empty());
    assert_eq!(provider.len(), 1);
    assert!(coordinator.tombstones().contains(&LocalId::from("a")));
    assert!(!coordinator.identity().contains(&LocalId::from("a")));

    provider.fail_fetch_with(None);
    let outcome = coordinator.perform_full_sync(Vec::new()).unwrap();
    assert!(outcome.records.is_empty());
    assert!(provider.is_empty());
    assert!(coordinator.tombstones().is_empty());
}

#[test]
fn unmapped_tombstone_survives_failed_fetch() {
    let (mut coordinator, provider) = setup();
    coordinator.mark_deleted_locally(LocalId::from("z")).unwrap();
    provider.fail_fetch_with(Some(ProviderError::transport_retryable("timeout")));

    coordinator.perform_full_sync(Vec::new()).unwrap();
    assert!(coordinator.tombstones().contains(&LocalId::from("z")));

    provider.fail_fetch_with(None);
    coordinator.perform_full_sync(Vec::new()).unwrap();
    assert!(coordinator.tombstones().is_empty());
}

#[test]
fn delete_one_removes_remote_copy() {
    let (mut coordinator, provider) = setup();
    let remote_id = coordinator.upload_one(&entry("a", 1)).unwrap();

    assert_eq!(
        coordinator.delete_one(&LocalId::from("a")).unwrap(),
        DeleteOutcome::Deleted(remote_id)
    );
    assert!(provider.is_empty());
    assert!(coordinator.identity().is_empty());
}

// ============================================================================
// Durable state
// ============================================================================

#[test]
fn file_state_survives_restart() {
    let state_dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(InMemoryProvider::new());

    {
        let store: Arc<dyn StateStore> = Arc::new(FileStore::open(state_dir.path()).unwrap());
        let mut coordinator: MemCoordinator =
            SyncCoordinator::open(SyncConfig::new("entries"), Arc::clone(&provider), store)
                .unwrap();
        coordinator
            .perform_full_sync(vec![entry("a", 1), entry("b", 2)])
            .unwrap();
        provider.set_available(false);
        coordinator.delete_one(&LocalId::from("b")).unwrap();
    }

    let store: Arc<dyn StateStore> = Arc::new(FileStore::open(state_dir.path()).unwrap());
    let mut coordinator: MemCoordinator =
        SyncCoordinator::open(SyncConfig::new("entries"), Arc::clone(&provider), store).unwrap();

    assert_eq!(coordinator.identity().len(), 2);
    assert!(coordinator.tombstones().contains(&LocalId::from("b")));
    assert!(coordinator.last_sync_timestamp().is_some());

    provider.set_available(true);
    provider.reset_counters();
    let outcome = coordinator.perform_full_sync(vec![entry("a", 1)]).unwrap();

    assert_eq!(ids(&outcome.records), vec!["a"]);
    assert_eq!(provider.save_count(), 0);
    assert_eq!(provider.delete_count(), 1);
    assert_eq!(provider.len(), 1);
}

#[test]
fn file_directory_provider_between_two_devices() {
    let remote_dir = tempfile::tempdir().unwrap();
    let open = || -> SyncCoordinator<Entry, DirectoryProvider> {
        SyncCoordinator::open(
            SyncConfig::new("entries"),
            DirectoryProvider::new(remote_dir.path()),
            Arc::new(InMemoryStore::new()),
        )
        .unwrap()
    };
    let mut laptop = open();
    let mut phone = open();

    // Nothing provisioned yet: the fetch fails and the upload creates it.
    let first = laptop.perform_full_sync(vec![entry("a", 1)]).unwrap();
    assert!(first.report.fetch_error.is_some());

    let pulled = phone.perform_full_sync(Vec::new()).unwrap();
    assert_eq!(pulled.records, vec![entry("a", 1)]);
    assert_eq!(
        phone.identity().get(&LocalId::from("a")),
        laptop.identity().get(&LocalId::from("a"))
    );

    let mut edited = entry("a", 5);
    edited.body = "edited on phone".into();
    phone.update_one(&edited).unwrap();

    let refreshed = laptop.perform_full_sync(first.records).unwrap();
    assert_eq!(refreshed.records, vec![edited]);
    assert_eq!(refreshed.report.uploads_attempted, 0);
    assert_eq!(
        DirectoryProvider::new(remote_dir.path())
            .fetch_all("Entry")
            .unwrap()
            .len(),
        1
    );
}

// ============================================================================
// Worker handle
// ============================================================================

#[tokio::test]
async fn handle_runs_commands_on_worker() {
    let (coordinator, provider) = setup();
    let handle = SyncHandle::spawn(coordinator).unwrap();
    assert_eq!(handle.entity_type(), "entries");

    let remote_id = handle.upload_one(entry("a", 1)).await.unwrap();
    assert_eq!(provider.len(), 1);

    let outcome = handle
        .perform_full_sync(vec![entry("a", 1), entry("b", 2)])
        .await
        .unwrap();
    assert_eq!(ids(&outcome.records), vec!["b", "a"]);
    assert!(!handle.is_syncing());

    handle
        .mark_deleted_locally(LocalId::from("b"))
        .await
        .unwrap();
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.entity_type, "entries");
    assert_eq!(snapshot.tombstoned, vec![LocalId::from("b")]);
    assert!(snapshot
        .mapped
        .contains(&(LocalId::from("a"), remote_id.clone())));
    assert_eq!(snapshot.stats.cycles_completed, 1);

    assert_eq!(
        handle.delete_one(LocalId::from("a")).await.unwrap(),
        DeleteOutcome::Deleted(remote_id)
    );

    handle.shutdown().await.unwrap();
    assert!(matches!(
        handle.snapshot().await,
        Err(SyncError::WorkerClosed)
    ));
}

#[tokio::test]
async fn handles_for_two_entity_types_sync_concurrently() {
    let provider = Arc::new(InMemoryProvider::new());
    let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
    let spawn = |entity: &str| {
        let coordinator: MemCoordinator = SyncCoordinator::open(
            SyncConfig::new(entity),
            Arc::clone(&provider),
            Arc::clone(&store),
        )
        .unwrap();
        SyncHandle::spawn(coordinator).unwrap()
    };
    let entries = spawn("entries");
    let archive = spawn("archive");

    let (a, b) = tokio::join!(
        entries.perform_full_sync(vec![entry("a", 1)]),
        archive.perform_full_sync(vec![entry("b", 2)]),
    );

    assert_eq!(a.unwrap().report.entity_type, "entries");
    assert_eq!(b.unwrap().report.entity_type, "archive");
    assert!(store.get("entries.identity_map").unwrap().is_some());
    assert!(store.get("archive.identity_map").unwrap().is_some());
}

/// Holds every fetch until the test releases it.
struct GatedProvider {
    inner: InMemoryProvider,
    gate: parking_lot::Mutex<std::sync::mpsc::Receiver<()>>,
}

impl RemoteProvider for GatedProvider {
    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    fn fetch_all(&self, record_type: &str) -> ProviderResult<Vec<RemoteRecord>> {
        let _ = self.gate.lock().recv();
        self.inner.fetch_all(record_type)
    }

    fn save(&self, record: RemoteRecord) -> ProviderResult<RemoteRecord> {
        self.inner.save(record)
    }

    fn delete(&self, remote_id: &RemoteId) -> ProviderResult<()> {
        self.inner.delete(remote_id)
    }
}

#[tokio::test]
async fn handle_rejects_overlapping_full_sync() {
    let (release, gate) = std::sync::mpsc::channel();
    let provider = GatedProvider {
        inner: InMemoryProvider::new(),
        gate: parking_lot::Mutex::new(gate),
    };
    let coordinator: SyncCoordinator<Entry, _> = SyncCoordinator::open(
        SyncConfig::new("entries"),
        provider,
        Arc::new(InMemoryStore::new()),
    )
    .unwrap();
    let handle = SyncHandle::spawn(coordinator).unwrap();

    let running = tokio::spawn({
        let handle = handle.clone();
        async move { handle.perform_full_sync(vec![entry("a", 1)]).await }
    });
    while !handle.is_syncing() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(matches!(
        handle.perform_full_sync(Vec::new()).await,
        Err(SyncError::SyncInProgress { .. })
    ));

    release.send(()).unwrap();
    let outcome = running.await.unwrap().unwrap();
    assert_eq!(outcome.records, vec![entry("a", 1)]);
    assert!(!handle.is_syncing());
}
