//! In-memory remote file gateway for tests.
//!
//! Behaves like the Drive folder: provider-assigned ids, a fresh
//! `modifiedTime` on every write, missing-file deletes succeed. Every call is
//! recorded so tests can assert exactly which network operations a pass made.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat};
use tokio::sync::watch;

use crate::file_storage::{FileStorageError, RemoteFileGateway};
use crate::models::{Note, RemoteFile};

const BASE_EPOCH_SECS: i64 = 1_735_689_600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GatewayCall {
    List,
    Find(String),
    Download(String),
    Upload {
        name: String,
        remote_id: Option<String>,
    },
    Delete(String),
}

#[derive(Debug, Clone)]
struct StoredFile {
    name: String,
    modified_time: String,
    content: String,
}

pub(crate) struct MemoryGateway {
    files: Mutex<BTreeMap<String, StoredFile>>,
    next_id: AtomicU64,
    revision: AtomicI64,
    calls: Mutex<Vec<GatewayCall>>,
    failing_downloads: Mutex<HashSet<String>>,
    failing_uploads: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    listing_fails: AtomicBool,
    auth_expired: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    list_gate: watch::Sender<bool>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        let (list_gate, _) = watch::channel(true);
        Self {
            files: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            revision: AtomicI64::new(0),
            calls: Mutex::new(Vec::new()),
            failing_downloads: Mutex::new(HashSet::new()),
            failing_uploads: Mutex::new(HashSet::new()),
            failing_deletes: Mutex::new(HashSet::new()),
            listing_fails: AtomicBool::new(false),
            auth_expired: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            list_gate,
        }
    }

    fn next_modified_time(&self) -> String {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        DateTime::from_timestamp(BASE_EPOCH_SECS + revision, 0)
            .unwrap()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn next_remote_id(&self) -> String {
        format!("remote-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn record(&self, call: GatewayCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_auth(&self) -> Result<(), FileStorageError> {
        if self.auth_expired.load(Ordering::SeqCst) {
            Err(FileStorageError::Auth("HTTP 401: token expired".to_string()))
        } else {
            Ok(())
        }
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn snapshot_listing(&self) -> Vec<RemoteFile> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .map(|(id, f)| RemoteFile::new(id.clone(), f.name.clone(), f.modified_time.clone()))
            .collect()
    }

    fn id_for_name(&self, name: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .find(|(_, f)| f.name == name)
            .map(|(id, _)| id.clone())
    }

    // Fixtures

    /// Store a note as a new remote file
    pub fn insert_note(&self, note: &Note) -> RemoteFile {
        self.insert_raw(&note.file_name(), &serde_json::to_string(note).unwrap())
    }

    /// Store arbitrary content under a name
    pub fn insert_raw(&self, name: &str, content: &str) -> RemoteFile {
        let remote_id = self.next_remote_id();
        let modified_time = self.next_modified_time();
        self.files.lock().unwrap().insert(
            remote_id.clone(),
            StoredFile {
                name: name.to_string(),
                modified_time: modified_time.clone(),
                content: content.to_string(),
            },
        );
        RemoteFile::new(remote_id, name, modified_time)
    }

    /// Write a note the way another device would: replace or create
    pub fn put_note(&self, note: &Note) -> RemoteFile {
        let name = note.file_name();
        match self.id_for_name(&name) {
            Some(remote_id) => {
                let modified_time = self.next_modified_time();
                let mut files = self.files.lock().unwrap();
                let file = files.get_mut(&remote_id).unwrap();
                file.content = serde_json::to_string(note).unwrap();
                file.modified_time = modified_time.clone();
                RemoteFile::new(remote_id, name, modified_time)
            }
            None => self.insert_note(note),
        }
    }

    /// Delete a file the way another device would
    pub fn remove_by_name(&self, name: &str) -> bool {
        match self.id_for_name(name) {
            Some(remote_id) => self.files.lock().unwrap().remove(&remote_id).is_some(),
            None => false,
        }
    }

    pub fn note_by_name(&self, name: &str) -> Option<Note> {
        let files = self.files.lock().unwrap();
        files
            .values()
            .find(|f| f.name == name)
            .and_then(|f| serde_json::from_str(&f.content).ok())
    }

    pub fn file_by_name(&self, name: &str) -> Option<RemoteFile> {
        self.snapshot_listing().into_iter().find(|f| f.name == name)
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    // Failure injection

    pub fn fail_downloads_of(&self, remote_id: &str) {
        self.failing_downloads
            .lock()
            .unwrap()
            .insert(remote_id.to_string());
    }

    pub fn fail_uploads_of(&self, name: &str) {
        self.failing_uploads.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_deletes_of(&self, remote_id: &str) {
        self.failing_deletes
            .lock()
            .unwrap()
            .insert(remote_id.to_string());
    }

    pub fn fail_listing(&self, fail: bool) {
        self.listing_fails.store(fail, Ordering::SeqCst);
    }

    pub fn expire_auth(&self) {
        self.auth_expired.store(true, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.failing_downloads.lock().unwrap().clear();
        self.failing_uploads.lock().unwrap().clear();
        self.failing_deletes.lock().unwrap().clear();
        self.listing_fails.store(false, Ordering::SeqCst);
        self.auth_expired.store(false, Ordering::SeqCst);
    }

    /// Block `list_files` callers until `resume_listing`
    pub fn pause_listing(&self) {
        self.list_gate.send_replace(false);
    }

    pub fn resume_listing(&self) {
        self.list_gate.send_replace(true);
    }

    // Call log

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn list_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, GatewayCall::List))
            .count()
    }

    pub fn uploads(&self) -> Vec<(String, Option<String>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::Upload { name, remote_id } => Some((name, remote_id)),
                _ => None,
            })
            .collect()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::Download(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Downloads, uploads and deletes made so far
    pub fn transfer_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    GatewayCall::Download(_) | GatewayCall::Upload { .. } | GatewayCall::Delete(_)
                )
            })
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl RemoteFileGateway for MemoryGateway {
    async fn list_files(&self) -> Result<Vec<RemoteFile>, FileStorageError> {
        self.record(GatewayCall::List);
        let mut gate = self.list_gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        self.check_auth()?;
        if self.listing_fails.load(Ordering::SeqCst) {
            return Err(FileStorageError::Network("listing unavailable".to_string()));
        }
        Ok(self.snapshot_listing())
    }

    async fn find_file(&self, name: &str) -> Result<Option<RemoteFile>, FileStorageError> {
        self.record(GatewayCall::Find(name.to_string()));
        self.check_auth()?;
        Ok(self.file_by_name(name))
    }

    async fn download(&self, remote_id: &str) -> Result<Note, FileStorageError> {
        self.record(GatewayCall::Download(remote_id.to_string()));
        self.enter();
        tokio::task::yield_now().await;
        self.exit();
        self.check_auth()?;

        if self.failing_downloads.lock().unwrap().contains(remote_id) {
            return Err(FileStorageError::Network(format!(
                "connection reset downloading {}",
                remote_id
            )));
        }
        let content = self
            .files
            .lock()
            .unwrap()
            .get(remote_id)
            .map(|f| f.content.clone())
            .ok_or_else(|| FileStorageError::NotFound(remote_id.to_string()))?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn upload(
        &self,
        name: &str,
        note: &Note,
        existing_remote_id: Option<&str>,
    ) -> Result<RemoteFile, FileStorageError> {
        self.record(GatewayCall::Upload {
            name: name.to_string(),
            remote_id: existing_remote_id.map(str::to_string),
        });
        self.enter();
        tokio::task::yield_now().await;
        self.exit();
        self.check_auth()?;

        if self.failing_uploads.lock().unwrap().contains(name) {
            return Err(FileStorageError::Http {
                status: 403,
                body: format!("quota exceeded writing {}", name),
            });
        }

        let content = serde_json::to_string(note)?;
        let modified_time = self.next_modified_time();
        let remote_id = match existing_remote_id {
            Some(remote_id) => {
                let mut files = self.files.lock().unwrap();
                let file = files
                    .get_mut(remote_id)
                    .ok_or_else(|| FileStorageError::NotFound(remote_id.to_string()))?;
                file.content = content;
                file.modified_time = modified_time.clone();
                remote_id.to_string()
            }
            None => {
                let remote_id = self.next_remote_id();
                self.files.lock().unwrap().insert(
                    remote_id.clone(),
                    StoredFile {
                        name: name.to_string(),
                        modified_time: modified_time.clone(),
                        content,
                    },
                );
                remote_id
            }
        };
        Ok(RemoteFile::new(remote_id, name, modified_time))
    }

    async fn delete(&self, remote_id: &str) -> Result<(), FileStorageError> {
        self.record(GatewayCall::Delete(remote_id.to_string()));
        self.check_auth()?;
        if self.failing_deletes.lock().unwrap().contains(remote_id) {
            return Err(FileStorageError::Network(format!(
                "timeout deleting {}",
                remote_id
            )));
        }
        self.files.lock().unwrap().remove(remote_id);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}
