//! Remote file gateway abstraction.
//!
//! The cloud store is a dumb bucket of note files in an app-private folder:
//! list, download, create-or-replace, delete. No merge logic lives there.
//!
//! Besides the trait, this module provides the batched variants used by the
//! executor. They run at most `limit` transfers at a time and always return
//! partial results: one failing note never aborts the rest of the batch.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use futures::stream::{self, StreamExt};

use crate::error::ErrorCategory;
use crate::models::{Note, RemoteFile};

/// Errors that can occur during remote storage operations.
#[derive(Debug)]
pub enum FileStorageError {
    /// Configuration is missing or invalid
    Config(String),
    /// Token missing/expired or the provider answered 401
    Auth(String),
    /// Transport failure, timeout, rate limit or provider outage
    Network(String),
    /// File not found in storage
    NotFound(String),
    /// Any other non-success HTTP status
    Http { status: u16, body: String },
    /// Response body could not be decoded
    Decode(String),
}

impl FileStorageError {
    /// User-facing category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            FileStorageError::Auth(_) => ErrorCategory::Auth,
            FileStorageError::Network(_) => ErrorCategory::Network,
            _ => ErrorCategory::Generic,
        }
    }

    /// Map a non-success HTTP status to an error
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 => FileStorageError::Auth(format!("HTTP 401: {}", body)),
            404 => FileStorageError::NotFound(body),
            408 | 429 | 500..=599 => FileStorageError::Network(format!("HTTP {}: {}", status, body)),
            _ => FileStorageError::Http { status, body },
        }
    }
}

impl std::error::Error for FileStorageError {}

impl fmt::Display for FileStorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStorageError::Config(msg) => write!(f, "Configuration error: {}", msg),
            FileStorageError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            FileStorageError::Network(msg) => write!(f, "Network error: {}", msg),
            FileStorageError::NotFound(msg) => write!(f, "File not found: {}", msg),
            FileStorageError::Http { status, body } => write!(f, "HTTP {}: {}", status, body),
            FileStorageError::Decode(msg) => write!(f, "Invalid response: {}", msg),
        }
    }
}

impl From<serde_json::Error> for FileStorageError {
    fn from(err: serde_json::Error) -> Self {
        FileStorageError::Decode(err.to_string())
    }
}

/// Trait for remote file store implementations.
///
/// # Example
///
/// ```ignore
/// use memorysync::file_storage::{FileStorageError, RemoteFileGateway};
///
/// async fn count_files(gateway: &impl RemoteFileGateway) -> Result<usize, FileStorageError> {
///     Ok(gateway.list_files().await?.len())
/// }
/// ```
pub trait RemoteFileGateway: Send + Sync {
    /// List every non-trashed file in the app folder, all pages concatenated.
    fn list_files(
        &self,
    ) -> impl Future<Output = Result<Vec<RemoteFile>, FileStorageError>> + Send;

    /// Find a file in the app folder by exact name.
    fn find_file(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<RemoteFile>, FileStorageError>> + Send;

    /// Download and decode a note file.
    fn download(
        &self,
        remote_id: &str,
    ) -> impl Future<Output = Result<Note, FileStorageError>> + Send;

    /// Upload a note file.
    ///
    /// Without `existing_remote_id` a new file named `name` is created;
    /// with it the file's content is replaced in place.
    fn upload(
        &self,
        name: &str,
        note: &Note,
        existing_remote_id: Option<&str>,
    ) -> impl Future<Output = Result<RemoteFile, FileStorageError>> + Send;

    /// Delete a file. A file that is already gone counts as deleted.
    fn delete(
        &self,
        remote_id: &str,
    ) -> impl Future<Output = Result<(), FileStorageError>> + Send;

    /// Provider identifier used in logs
    fn provider_name(&self) -> &'static str;
}

/// One item of a batch that failed
#[derive(Debug)]
pub struct BatchFailure {
    /// Remote id for downloads, file name for uploads
    pub key: String,
    pub error: FileStorageError,
}

/// Result of a batched download
#[derive(Debug, Default)]
pub struct DownloadBatch {
    /// remote id → decoded note
    pub contents: HashMap<String, Note>,
    pub failures: Vec<BatchFailure>,
}

impl DownloadBatch {
    pub fn failed_keys(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.key.as_str()).collect()
    }
}

/// A note queued for upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadItem {
    pub name: String,
    pub note: Note,
    /// Present for an in-place replace, absent for a create
    pub remote_id: Option<String>,
}

impl UploadItem {
    pub fn new(note: Note, remote_id: Option<String>) -> Self {
        Self {
            name: note.file_name(),
            note,
            remote_id,
        }
    }
}

/// Result of a batched upload
#[derive(Debug, Default)]
pub struct UploadBatch {
    /// file name → uploaded file
    pub uploaded: HashMap<String, RemoteFile>,
    pub failures: Vec<BatchFailure>,
}

impl UploadBatch {
    pub fn failed_keys(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.key.as_str()).collect()
    }
}

/// Download many files with at most `limit` requests in flight.
pub async fn download_many<G: RemoteFileGateway>(
    gateway: &G,
    remote_ids: &[String],
    limit: usize,
) -> DownloadBatch {
    let results: Vec<(String, Result<Note, FileStorageError>)> = stream::iter(remote_ids.to_vec())
        .map(|remote_id| async move {
            let result = gateway.download(&remote_id).await;
            (remote_id, result)
        })
        .buffer_unordered(limit.max(1))
        .collect()
        .await;

    let mut batch = DownloadBatch::default();
    for (remote_id, result) in results {
        match result {
            Ok(note) => {
                batch.contents.insert(remote_id, note);
            }
            Err(error) => {
                tracing::warn!(
                    provider = gateway.provider_name(),
                    remote_id = %remote_id,
                    error = %error,
                    "Download failed"
                );
                batch.failures.push(BatchFailure {
                    key: remote_id,
                    error,
                });
            }
        }
    }

    tracing::debug!(
        requested = remote_ids.len(),
        downloaded = batch.contents.len(),
        failed = batch.failures.len(),
        "Batched download finished"
    );
    batch
}

/// Upload many notes with at most `limit` requests in flight.
pub async fn upload_many<G: RemoteFileGateway>(
    gateway: &G,
    items: &[UploadItem],
    limit: usize,
) -> UploadBatch {
    let results: Vec<(String, Result<RemoteFile, FileStorageError>)> = stream::iter(items.to_vec())
        .map(|item| async move {
            let result = gateway
                .upload(&item.name, &item.note, item.remote_id.as_deref())
                .await;
            (item.name, result)
        })
        .buffer_unordered(limit.max(1))
        .collect()
        .await;

    let mut batch = UploadBatch::default();
    for (name, result) in results {
        match result {
            Ok(file) => {
                batch.uploaded.insert(name, file);
            }
            Err(error) => {
                tracing::warn!(
                    provider = gateway.provider_name(),
                    name = %name,
                    error = %error,
                    "Upload failed"
                );
                batch.failures.push(BatchFailure { key: name, error });
            }
        }
    }

    tracing::debug!(
        requested = items.len(),
        uploaded = batch.uploaded.len(),
        failed = batch.failures.len(),
        "Batched upload finished"
    );
    batch
}
