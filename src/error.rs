//! Error types for the sync engine.
//!
//! `SyncError` is the crate-wide error. `ErrorCategory` and `SyncFailure` are
//! the small user-facing taxonomy the controller reports after a failed pass.

use std::fmt;

use thiserror::Error;

use crate::file_storage::FileStorageError;

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Main error type for sync operations
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Authentication expired: {0}")]
    AuthExpired(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote storage error: {0}")]
    Storage(FileStorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Invalid sync plan: {0}")]
    InvalidPlan(String),

    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// User-facing category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::AuthExpired(_) => ErrorCategory::Auth,
            SyncError::Network(_) => ErrorCategory::Network,
            SyncError::Storage(e) => e.category(),
            _ => ErrorCategory::Generic,
        }
    }
}

impl From<FileStorageError> for SyncError {
    fn from(err: FileStorageError) -> Self {
        match err {
            FileStorageError::Auth(msg) => SyncError::AuthExpired(msg),
            FileStorageError::Network(msg) => SyncError::Network(msg),
            other => SyncError::Storage(other),
        }
    }
}

/// Coarse classification shown to the user after a failed pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCategory {
    Generic,
    Network,
    Auth,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Generic => "generic",
            ErrorCategory::Network => "network",
            ErrorCategory::Auth => "auth",
        }
    }

    /// Whether another pass may succeed without user action
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorCategory::Auth)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The user-facing error recorded by the controller after a failed pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub category: ErrorCategory,
    pub message: String,
}

impl SyncFailure {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    /// Short text suitable for a status line
    pub fn user_message(&self) -> &'static str {
        match self.category {
            ErrorCategory::Auth => "Cloud account disconnected. Reconnect to resume syncing.",
            ErrorCategory::Network => "Network unavailable. Sync will retry.",
            ErrorCategory::Generic => "Some notes could not be synced. Sync will retry.",
        }
    }
}

impl From<&SyncError> for SyncFailure {
    fn from(err: &SyncError) -> Self {
        SyncFailure::new(err.category(), err.to_string())
    }
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.category)
    }
}
