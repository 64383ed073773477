//! Deterministic whole-record merge.
//!
//! Pure functions, no I/O. The coordinator feeds them the fetched remote
//! copies and the caller's local records and acts on the resulting plan.

use recsync_protocol::{Conflict, ConflictPolicy, LocalId, RemoteId, Resolution, SyncRecord};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// A decoded remote record together with its remote identifier.
#[derive(Debug, Clone)]
pub struct RemoteCopy<R> {
    /// Decoded record.
    pub record: R,
    /// Identifier on the remote.
    pub remote_id: RemoteId,
}

/// The result of merging local and remote records.
#[derive(Debug, Clone)]
pub struct MergePlan<R> {
    /// One record per surviving local id, newest first.
    pub records: Vec<R>,
    /// Records to upload, in local id order.
    pub uploads: Vec<R>,
    /// Conflicts between differing local and remote copies.
    pub conflicts: Vec<Conflict>,
}

/// The fetched remote set, one winning copy per local id.
#[derive(Debug, Clone)]
pub struct RemoteSet<R> {
    /// The copy kept for each local id.
    pub copies: BTreeMap<LocalId, RemoteCopy<R>>,
    /// Remote ids of the copies that lost to the kept one.
    pub superseded: BTreeMap<LocalId, Vec<RemoteId>>,
}

impl<R> Default for RemoteSet<R> {
    fn default() -> Self {
        Self {
            copies: BTreeMap::new(),
            superseded: BTreeMap::new(),
        }
    }
}

impl<R> RemoteSet<R> {
    /// Returns every remote id holding a copy of `local_id`, kept copy first.
    pub fn remote_ids(&self, local_id: &LocalId) -> Vec<RemoteId> {
        self.copies
            .get(local_id)
            .map(|copy| copy.remote_id.clone())
            .into_iter()
            .chain(self.superseded.get(local_id).into_iter().flatten().cloned())
            .collect()
    }
}

/// Collapses fetched copies to one per local id.
///
/// Several remote copies of one record can exist when two devices uploaded it
/// before either saw the other's copy. The copy with the greater conflict
/// timestamp is kept; ties go to the smaller remote id so every device keeps
/// the same one. The other copies are listed in [`RemoteSet::superseded`].
pub fn collapse_remote<R: SyncRecord>(copies: Vec<RemoteCopy<R>>) -> RemoteSet<R> {
    let mut set = RemoteSet::default();
    for copy in copies {
        let local_id = copy.record.local_id();
        let keep_existing = set
            .copies
            .get(&local_id)
            .is_some_and(|kept| !supersedes(&copy, kept));
        let loser = if keep_existing {
            copy.remote_id
        } else {
            match set.copies.insert(local_id.clone(), copy) {
                Some(previous) => previous.remote_id,
                None => continue,
            }
        };
        tracing::debug!(local_id = %local_id, superseded = %loser, "duplicate remote copy");
        set.superseded.entry(local_id).or_default().push(loser);
    }
    set
}

fn supersedes<R: SyncRecord>(candidate: &RemoteCopy<R>, kept: &RemoteCopy<R>) -> bool {
    match candidate
        .record
        .conflict_timestamp()
        .cmp(&kept.record.conflict_timestamp())
    {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => candidate.remote_id < kept.remote_id,
    }
}

/// Merges local records into the remote set.
///
/// - Remote copies of ids in `excluded` are dropped, and so are local ones.
/// - A local record with no remote copy is kept and uploaded.
/// - When both copies exist and differ, `policy` decides; a winning local copy
///   is uploaded. Identical copies are neither conflicts nor uploads.
///
/// The output does not depend on the order of `local`, except that among
/// local duplicates with equal timestamps the first one is kept.
pub fn merge<R: SyncRecord>(
    local: Vec<R>,
    remote: &BTreeMap<LocalId, RemoteCopy<R>>,
    excluded: &BTreeSet<LocalId>,
    policy: ConflictPolicy,
) -> MergePlan<R> {
    let mut merged: BTreeMap<LocalId, (R, bool)> = remote
        .iter()
        .filter(|(id, _)| !excluded.contains(*id))
        .map(|(id, copy)| (id.clone(), (copy.record.clone(), false)))
        .collect();
    let mut conflicts = Vec::new();

    for (local_id, record) in collapse_local(local) {
        if excluded.contains(&local_id) {
            continue;
        }
        if !merged.contains_key(&local_id) {
            merged.insert(local_id, (record, true));
            continue;
        }
        let Some((existing, upload)) = merged.get_mut(&local_id) else {
            continue;
        };
        if existing.encode().fields == record.encode().fields {
            continue;
        }
        let conflict = Conflict::resolve(
            policy,
            local_id,
            record.conflict_timestamp(),
            existing.conflict_timestamp(),
        );
        if conflict.resolution == Resolution::KeepLocal {
            *existing = record;
            *upload = true;
        }
        conflicts.push(conflict);
    }

    let uploads = merged
        .values()
        .filter(|(_, upload)| *upload)
        .map(|(record, _)| record.clone())
        .collect();
    let mut records: Vec<R> = merged.into_values().map(|(record, _)| record).collect();
    sort_newest_first(&mut records);

    MergePlan {
        records,
        uploads,
        conflicts,
    }
}

fn collapse_local<R: SyncRecord>(local: Vec<R>) -> BTreeMap<LocalId, R> {
    let mut by_id: BTreeMap<LocalId, R> = BTreeMap::new();
    for record in local {
        let local_id = record.local_id();
        let superseded = by_id
            .get(&local_id)
            .is_some_and(|kept| record.conflict_timestamp() <= kept.conflict_timestamp());
        if !superseded {
            by_id.insert(local_id, record);
        }
    }
    by_id
}

/// Sorts by conflict timestamp descending, then local id ascending.
pub fn sort_newest_first<R: SyncRecord>(records: &mut [R]) {
    records.sort_by(|a, b| {
        b.conflict_timestamp()
            .cmp(&a.conflict_timestamp())
            .then_with(|| a.local_id().cmp(&b.local_id()))
    });
}
