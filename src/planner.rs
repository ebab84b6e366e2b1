//! Sync planning.
//!
//! Given the local notes, the current remote listing and (for delta passes)
//! the previous snapshot, decide what each note needs: download, upload,
//! remote delete or local purge. Planning is pure; nothing here touches the
//! network or the store.
//!
//! Notes flagged sample, pending or processing-error are invisible to the
//! planner in both directions, including their remote files.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use crate::error::{SyncError, SyncResult};
use crate::file_storage::UploadItem;
use crate::models::{Note, RemoteFile};
use crate::snapshot::SyncSnapshot;

/// A remote file to fetch, with the local note it may conflict with.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadTarget {
    pub note_id: String,
    pub remote: RemoteFile,
    pub local: Option<Note>,
}

/// A remote file to remove; the local tombstone is purged afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDeletion {
    pub note_id: String,
    pub remote_id: String,
}

/// Everything one pass will do, keyed by note id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    pub to_download: Vec<DownloadTarget>,
    pub to_upload: Vec<UploadItem>,
    pub to_delete_remote: Vec<RemoteDeletion>,
    pub to_hard_delete_local: Vec<String>,
}

/// Item counts per plan list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub downloads: usize,
    pub uploads: usize,
    pub remote_deletes: usize,
    pub local_deletes: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} down, {} up, {} remote deletes, {} local deletes",
            self.downloads, self.uploads, self.remote_deletes, self.local_deletes
        )
    }
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.to_download.len()
            + self.to_upload.len()
            + self.to_delete_remote.len()
            + self.to_hard_delete_local.len()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            downloads: self.to_download.len(),
            uploads: self.to_upload.len(),
            remote_deletes: self.to_delete_remote.len(),
            local_deletes: self.to_hard_delete_local.len(),
        }
    }

    /// Check that no note id appears in more than one entry
    pub fn ensure_disjoint(&self) -> SyncResult<()> {
        let ids = self
            .to_download
            .iter()
            .map(|t| t.note_id.as_str())
            .chain(self.to_upload.iter().map(|u| u.note.id.as_str()))
            .chain(self.to_delete_remote.iter().map(|d| d.note_id.as_str()))
            .chain(self.to_hard_delete_local.iter().map(String::as_str));

        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id) {
                return Err(SyncError::InvalidPlan(format!(
                    "note {} is scheduled more than once",
                    id
                )));
            }
        }
        Ok(())
    }

    fn download(&mut self, note_id: &str, remote: &RemoteFile, local: Option<&Note>) {
        self.to_download.push(DownloadTarget {
            note_id: note_id.to_string(),
            remote: remote.clone(),
            local: local.cloned(),
        });
    }

    fn upload(&mut self, note: &Note, remote: Option<&RemoteFile>) {
        self.to_upload.push(UploadItem::new(
            note.clone(),
            remote.map(|r| r.remote_id.clone()),
        ));
    }

    fn delete_remote(&mut self, note_id: &str, remote: &RemoteFile) {
        self.to_delete_remote.push(RemoteDeletion {
            note_id: note_id.to_string(),
            remote_id: remote.remote_id.clone(),
        });
    }
}

/// Local notes and remote files indexed by note id, exclusions applied.
struct Inventory<'a> {
    local: BTreeMap<&'a str, &'a Note>,
    remote: BTreeMap<&'a str, &'a RemoteFile>,
    excluded: HashSet<&'a str>,
}

impl<'a> Inventory<'a> {
    fn new(local_notes: &'a [Note], remote_files: &'a [RemoteFile]) -> Self {
        let mut local = BTreeMap::new();
        let mut excluded = HashSet::new();
        for note in local_notes {
            if note.is_syncable() {
                local.insert(note.id.as_str(), note);
            } else {
                excluded.insert(note.id.as_str());
            }
        }

        let mut remote = BTreeMap::new();
        for file in remote_files {
            let Some(note_id) = file.note_id() else {
                tracing::debug!(name = %file.name, "Ignoring non-note remote file");
                continue;
            };
            if excluded.contains(note_id) {
                continue;
            }
            if let Some(previous) = remote.insert(note_id, file) {
                // Keep the first listed copy; the duplicate is left alone.
                tracing::warn!(
                    note_id = %note_id,
                    kept = %previous.remote_id,
                    ignored = %file.remote_id,
                    "Duplicate remote file for note"
                );
                remote.insert(note_id, previous);
            }
        }

        Self {
            local,
            remote,
            excluded,
        }
    }
}

/// Full reconciliation: classify every id found on either side.
pub fn plan_full(local_notes: &[Note], remote_files: &[RemoteFile]) -> SyncPlan {
    let inventory = Inventory::new(local_notes, remote_files);
    let mut plan = SyncPlan::default();

    let ids: BTreeSet<&str> = inventory
        .local
        .keys()
        .chain(inventory.remote.keys())
        .copied()
        .collect();

    for id in ids {
        let local = inventory.local.get(id).copied();
        let remote = inventory.remote.get(id).copied();
        match (local, remote) {
            (Some(note), None) if note.is_deleted => {
                plan.to_hard_delete_local.push(id.to_string())
            }
            (Some(note), None) => plan.upload(note, None),
            (local, Some(file)) => plan.download(id, file, local),
            (None, None) => {}
        }
    }

    tracing::debug!(
        local = inventory.local.len(),
        remote = inventory.remote.len(),
        excluded = inventory.excluded.len(),
        plan = %plan.summary(),
        "Planned full reconciliation"
    );
    plan
}

/// Delta reconciliation against the snapshot of the last successful pass.
pub fn plan_delta(
    local_notes: &[Note],
    remote_files: &[RemoteFile],
    snapshot: &SyncSnapshot,
) -> SyncPlan {
    let inventory = Inventory::new(local_notes, remote_files);
    let last_sync_time = snapshot.last_sync_time.unwrap_or(i64::MIN);
    let mut plan = SyncPlan::default();
    let mut classified: HashSet<&str> = HashSet::new();

    // Remote files that changed since the last pass
    for (&id, &file) in &inventory.remote {
        if snapshot.is_changed(id, &file.modified_time) {
            plan.download(id, file, inventory.local.get(id).copied());
            classified.insert(id);
        }
    }

    // Files that disappeared: the other device's deletion wins
    for id in snapshot.entries.keys() {
        let id = id.as_str();
        if inventory.remote.contains_key(id) || inventory.excluded.contains(id) {
            continue;
        }
        if inventory.local.contains_key(id) {
            plan.to_hard_delete_local.push(id.to_string());
            classified.insert(id);
        }
    }

    // Local changes
    for (&id, &note) in &inventory.local {
        if classified.contains(id) {
            continue;
        }
        let remote = inventory.remote.get(id).copied();
        match remote {
            Some(file) if note.is_deleted => plan.delete_remote(id, file),
            None if note.is_deleted => plan.to_hard_delete_local.push(id.to_string()),
            Some(file) if note.timestamp > last_sync_time => plan.upload(note, Some(file)),
            Some(_) => {}
            // Never seen remotely: a create, even if its edit predates the
            // last pass (e.g. an exclusion flag cleared since then).
            None => plan.upload(note, None),
        }
    }

    tracing::debug!(
        local = inventory.local.len(),
        remote = inventory.remote.len(),
        snapshot = snapshot.entries.len(),
        plan = %plan.summary(),
        "Planned delta reconciliation"
    );
    plan
}
