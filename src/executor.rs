//! Plan execution.
//!
//! Phases run strictly in order: download (with last-write-wins conflict
//! resolution), upload, remote delete, local purge. Every phase runs to
//! completion and collects item failures instead of aborting. The snapshot
//! is replaced only when the whole pass succeeded; otherwise the next pass
//! sees the same differences and retries.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::Utc;

use crate::error::{ErrorCategory, SyncFailure, SyncResult};
use crate::file_storage::{
    download_many, upload_many, FileStorageError, RemoteFileGateway, UploadItem,
};
use crate::models::Note;
use crate::planner::{DownloadTarget, RemoteDeletion, SyncPlan};
use crate::snapshot::SyncSnapshot;
use crate::store::{NoteStore, SnapshotStore};
use crate::validation::validate_downloaded_note;

/// Which reconciliation produced the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Full,
    Delta,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::Delta => "delta",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExecuteOptions {
    pub mode: SyncMode,
    /// Maximum transfers in flight per phase
    pub transfer_limit: usize,
    /// Epoch ms the pass started; becomes the snapshot's last sync time
    pub started_at: i64,
}

impl ExecuteOptions {
    pub fn new(mode: SyncMode, transfer_limit: usize) -> Self {
        Self {
            mode,
            transfer_limit,
            started_at: Utc::now().timestamp_millis(),
        }
    }
}

/// A note that could not be synced this pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub note_id: String,
    pub category: ErrorCategory,
    pub message: String,
}

impl ItemFailure {
    fn new(note_id: &str, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            note_id: note_id.to_string(),
            category,
            message: message.into(),
        }
    }

    fn from_storage(note_id: &str, error: &FileStorageError) -> Self {
        Self::new(note_id, error.category(), error.to_string())
    }
}

/// Outcome of one pass
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub mode: SyncMode,
    pub downloaded: usize,
    pub uploaded: usize,
    pub deleted_remote: usize,
    pub deleted_local: usize,
    pub failures: Vec<ItemFailure>,
    pub snapshot_saved: bool,
}

impl PassReport {
    fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            downloaded: 0,
            uploaded: 0,
            deleted_remote: 0,
            deleted_local: 0,
            failures: Vec::new(),
            snapshot_saved: false,
        }
    }

    /// Number of notes changed on either side
    pub fn applied_count(&self) -> usize {
        self.downloaded + self.uploaded + self.deleted_remote + self.deleted_local
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.note_id.as_str()).collect()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// User-facing failure, using the most significant category present
    pub fn failure(&self) -> Option<SyncFailure> {
        let worst = self.failures.iter().max_by_key(|f| f.category)?;
        Some(SyncFailure::new(
            worst.category,
            format!(
                "{} note(s) failed to sync, e.g. {}: {}",
                self.failures.len(),
                worst.note_id,
                worst.message
            ),
        ))
    }

    fn fail(&mut self, failure: ItemFailure) {
        tracing::warn!(
            note_id = %failure.note_id,
            category = %failure.category,
            error = %failure.message,
            "Sync item failed"
        );
        self.failures.push(failure);
    }
}

/// Work discovered while resolving downloads
#[derive(Default)]
struct Requeued {
    uploads: Vec<UploadItem>,
    deletions: Vec<RemoteDeletion>,
}

/// Execute a plan against the gateway and the local stores.
///
/// Returns `Err` only for problems that stop the pass as a whole (an invalid
/// plan, the final listing or the snapshot write failing). Per-note problems
/// end up in `PassReport::failures`.
pub async fn execute_plan<G, N, P>(
    plan: SyncPlan,
    gateway: &G,
    notes: &N,
    snapshots: &P,
    options: ExecuteOptions,
) -> SyncResult<PassReport>
where
    G: RemoteFileGateway,
    N: NoteStore + Sync,
    P: SnapshotStore + Sync,
{
    plan.ensure_disjoint()?;

    let summary = plan.summary();
    tracing::info!(
        mode = %options.mode,
        provider = gateway.provider_name(),
        plan = %summary,
        "Executing sync plan"
    );

    let SyncPlan {
        to_download,
        mut to_upload,
        mut to_delete_remote,
        to_hard_delete_local,
    } = plan;
    let mut report = PassReport::new(options.mode);

    let requeued = download_phase(&to_download, gateway, notes, &options, &mut report).await;
    to_upload.extend(requeued.uploads);
    to_delete_remote.extend(requeued.deletions);

    upload_phase(&to_upload, gateway, &options, &mut report).await;
    remote_delete_phase(&to_delete_remote, gateway, notes, &mut report).await;

    for note_id in &to_hard_delete_local {
        match notes.delete(note_id) {
            Ok(()) => report.deleted_local += 1,
            Err(e) => report.fail(ItemFailure::new(note_id, e.category(), e.to_string())),
        }
    }

    if report.is_success() {
        save_snapshot(gateway, notes, snapshots, options.started_at).await?;
        report.snapshot_saved = true;
        tracing::info!(
            mode = %options.mode,
            downloaded = report.downloaded,
            uploaded = report.uploaded,
            deleted_remote = report.deleted_remote,
            deleted_local = report.deleted_local,
            "Sync pass complete"
        );
    } else {
        tracing::error!(
            mode = %options.mode,
            failed = report.failures.len(),
            applied = report.applied_count(),
            "Sync pass finished with failures, snapshot kept"
        );
    }

    Ok(report)
}

async fn download_phase<G, N>(
    targets: &[DownloadTarget],
    gateway: &G,
    notes: &N,
    options: &ExecuteOptions,
    report: &mut PassReport,
) -> Requeued
where
    G: RemoteFileGateway,
    N: NoteStore,
{
    let mut requeued = Requeued::default();
    if targets.is_empty() {
        return requeued;
    }

    let remote_ids: Vec<String> = targets.iter().map(|t| t.remote.remote_id.clone()).collect();
    let mut batch = download_many(gateway, &remote_ids, options.transfer_limit).await;
    let errors: HashMap<String, FileStorageError> = batch
        .failures
        .drain(..)
        .map(|f| (f.key, f.error))
        .collect();

    for target in targets {
        let remote_id = &target.remote.remote_id;
        let Some(remote) = batch.contents.remove(remote_id) else {
            let failure = match errors.get(remote_id) {
                Some(error) => ItemFailure::from_storage(&target.note_id, error),
                None => ItemFailure::new(&target.note_id, ErrorCategory::Generic, "download missing"),
            };
            report.fail(failure);
            continue;
        };

        if let Err(e) = validate_downloaded_note(&target.remote.name, &remote) {
            report.fail(ItemFailure::new(&target.note_id, e.category(), e.to_string()));
            continue;
        }

        match apply_remote(target, remote, notes, &mut requeued) {
            Ok(true) => report.downloaded += 1,
            Ok(false) => {}
            Err(e) => report.fail(ItemFailure::new(&target.note_id, e.category(), e.to_string())),
        }
    }

    requeued
}

/// Last-write-wins on `timestamp`. Returns whether the local store changed.
fn apply_remote<N: NoteStore>(
    target: &DownloadTarget,
    remote: Note,
    notes: &N,
    requeued: &mut Requeued,
) -> SyncResult<bool> {
    let Some(local) = &target.local else {
        if remote.is_deleted {
            tracing::debug!(note_id = %remote.id, "Remote tombstone with no local copy");
            return Ok(false);
        }
        notes.save(&remote)?;
        return Ok(true);
    };

    if remote.timestamp > local.timestamp {
        if remote.is_deleted {
            notes.delete(&remote.id)?;
        } else {
            notes.save(&remote)?;
        }
        tracing::debug!(
            note_id = %remote.id,
            remote_ts = remote.timestamp,
            local_ts = local.timestamp,
            "Remote copy is newer"
        );
        Ok(true)
    } else if local.timestamp > remote.timestamp {
        tracing::debug!(
            note_id = %local.id,
            remote_ts = remote.timestamp,
            local_ts = local.timestamp,
            "Local copy is newer"
        );
        if local.is_deleted {
            requeued.deletions.push(RemoteDeletion {
                note_id: local.id.clone(),
                remote_id: target.remote.remote_id.clone(),
            });
        } else {
            requeued.uploads.push(UploadItem::new(
                local.clone(),
                Some(target.remote.remote_id.clone()),
            ));
        }
        Ok(false)
    } else {
        // Equal timestamps are treated as the same write.
        Ok(false)
    }
}

async fn upload_phase<G: RemoteFileGateway>(
    items: &[UploadItem],
    gateway: &G,
    options: &ExecuteOptions,
    report: &mut PassReport,
) {
    if items.is_empty() {
        return;
    }

    let note_ids: HashMap<&str, &str> = items
        .iter()
        .map(|item| (item.name.as_str(), item.note.id.as_str()))
        .collect();
    let batch = upload_many(gateway, items, options.transfer_limit).await;

    report.uploaded += batch.uploaded.len();
    for failure in &batch.failures {
        let note_id = note_ids
            .get(failure.key.as_str())
            .copied()
            .unwrap_or(failure.key.as_str());
        report.fail(ItemFailure::from_storage(note_id, &failure.error));
    }
}

async fn remote_delete_phase<G, N>(
    deletions: &[RemoteDeletion],
    gateway: &G,
    notes: &N,
    report: &mut PassReport,
) where
    G: RemoteFileGateway,
    N: NoteStore,
{
    for deletion in deletions {
        if let Err(e) = gateway.delete(&deletion.remote_id).await {
            report.fail(ItemFailure::from_storage(&deletion.note_id, &e));
            continue;
        }
        match notes.delete(&deletion.note_id) {
            Ok(()) => report.deleted_remote += 1,
            Err(e) => report.fail(ItemFailure::new(
                &deletion.note_id,
                e.category(),
                e.to_string(),
            )),
        }
    }
}

/// Re-list the folder and persist it as the new snapshot.
///
/// Remote files of excluded local notes are left out so that, once the
/// flag clears, the next delta pass compares both sides again.
async fn save_snapshot<G, N, P>(
    gateway: &G,
    notes: &N,
    snapshots: &P,
    started_at: i64,
) -> SyncResult<()>
where
    G: RemoteFileGateway,
    N: NoteStore,
    P: SnapshotStore,
{
    let files = gateway.list_files().await?;
    let mut snapshot = SyncSnapshot::from_listing(&files, started_at);

    let excluded: HashSet<String> = notes
        .get_all()?
        .into_iter()
        .filter(|n| !n.is_syncable())
        .map(|n| n.id)
        .collect();
    for id in &excluded {
        snapshot.forget(id);
    }

    snapshots.save_snapshot(&snapshot)?;
    tracing::debug!(
        entries = snapshot.entries.len(),
        last_sync_time = started_at,
        "Saved sync snapshot"
    );
    Ok(())
}
