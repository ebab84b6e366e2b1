//! memorysync - offline-first synchronization engine for notes.
//!
//! Notes live in a local SQLite store and are replicated through a cloud
//! folder used as a plain file bucket, one `<id>.json` file per note. This
//! library provides:
//! - Data models (Note, RemoteFile) and validation
//! - Local persistence (SQLite) for notes and the sync snapshot
//! - The remote gateway abstraction and its Google Drive implementation
//! - Sync planning (full and delta) and plan execution
//! - The sync controller (debounce, overlap guard, error reporting)
//! - Configuration management
//!
//! The library installs no tracing subscriber; that is left to the host
//! application.
//!
//! # Feature Flags
//!
//! - `desktop`: Fall back to the platform config directory when none is given.

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod file_storage;
pub mod file_storage_drive;
pub mod models;
pub mod planner;
pub mod snapshot;
pub mod store;
pub mod sync_controller;
pub mod validation;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use auth::{AccessTokenProvider, SharedToken};
pub use config::{Config, SyncConfig};
pub use database::Database;
pub use error::{ErrorCategory, SyncError, SyncFailure, SyncResult};
pub use executor::{PassReport, SyncMode};
pub use file_storage::{FileStorageError, RemoteFileGateway};
pub use file_storage_drive::{DriveConfig, DriveStorageService};
pub use models::{Note, RemoteFile};
pub use planner::SyncPlan;
pub use snapshot::SyncSnapshot;
pub use sync_controller::{SyncController, SyncState};
