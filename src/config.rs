//! Configuration management for the sync engine.
//!
//! This module handles loading and saving configuration to/from a JSON file
//! in a config directory. A missing or unreadable file yields defaults,
//! which are written back so the user has something to edit.
//!
//! Sync settings cover:
//! - debounce delay for bursts of triggers
//! - size of the transfer pool used by batched downloads/uploads
//! - remote folder, page size and API endpoints of the cloud store

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Default Drive REST endpoint for metadata calls
pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

/// Default Drive REST endpoint for content uploads
pub const DEFAULT_UPLOAD_BASE_URL: &str = "https://www.googleapis.com/upload/drive/v3";

/// Sync configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Delay between the last trigger of a burst and the pass it starts
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Maximum in-flight transfers in batched phases
    #[serde(default = "default_max_concurrent_transfers")]
    pub max_concurrent_transfers: usize,
    /// Files requested per listing page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// App-private folder holding the note files
    #[serde(default = "default_drive_folder")]
    pub drive_folder: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_upload_base_url")]
    pub upload_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_max_concurrent_transfers() -> usize {
    6
}

fn default_page_size() -> u32 {
    1000
}

fn default_drive_folder() -> String {
    "appDataFolder".to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_upload_base_url() -> String {
    DEFAULT_UPLOAD_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            debounce_ms: default_debounce_ms(),
            max_concurrent_transfers: default_max_concurrent_transfers(),
            page_size: default_page_size(),
            drive_folder: default_drive_folder(),
            api_base_url: default_api_base_url(),
            upload_base_url: default_upload_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Transfer pool size, never zero
    pub fn transfer_limit(&self) -> usize {
        self.max_concurrent_transfers.max(1)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigData {
    /// Path to the database file
    #[serde(default)]
    pub database_file: String,
    /// Sync configuration
    #[serde(default)]
    pub sync: SyncConfig,
}

impl ConfigData {
    fn defaults_for(config_dir: &Path) -> Self {
        Self {
            database_file: config_dir
                .join("memories.db")
                .to_string_lossy()
                .to_string(),
            sync: SyncConfig::default(),
        }
    }
}

/// Configuration manager
pub struct Config {
    config_dir: PathBuf,
    config_file: PathBuf,
    data: ConfigData,
}

impl Config {
    /// Create a new configuration manager
    ///
    /// Without the `desktop` feature, `config_dir` is required.
    pub fn new(config_dir: Option<PathBuf>) -> SyncResult<Self> {
        let config_dir = match config_dir {
            Some(dir) => dir,
            None => {
                #[cfg(feature = "desktop")]
                {
                    dirs::config_dir()
                        .unwrap_or_else(|| PathBuf::from("."))
                        .join("memorysync")
                }
                #[cfg(not(feature = "desktop"))]
                {
                    return Err(SyncError::Config(
                        "config_dir is required on this platform".to_string(),
                    ));
                }
            }
        };

        fs::create_dir_all(&config_dir)?;
        let config_file = config_dir.join("config.json");

        let data = match fs::read_to_string(&config_file) {
            Ok(content) => match serde_json::from_str::<ConfigData>(&content) {
                Ok(mut data) => {
                    if data.database_file.is_empty() {
                        data.database_file = ConfigData::defaults_for(&config_dir).database_file;
                    }
                    data
                }
                Err(e) => {
                    tracing::warn!(
                        path = %config_file.display(),
                        error = %e,
                        "Config file is invalid, using defaults"
                    );
                    ConfigData::defaults_for(&config_dir)
                }
            },
            Err(_) => ConfigData::defaults_for(&config_dir),
        };

        let config = Self {
            config_dir,
            config_file,
            data,
        };

        if !config.config_file.exists() {
            config.save()?;
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> SyncResult<()> {
        let content = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.config_file, content)?;
        Ok(())
    }

    /// Get the configuration directory path
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Get the database file path
    pub fn database_file(&self) -> &str {
        &self.data.database_file
    }

    /// Get sync configuration
    pub fn sync_config(&self) -> &SyncConfig {
        &self.data.sync
    }

    /// Check if sync is enabled
    pub fn is_sync_enabled(&self) -> bool {
        self.data.sync.enabled
    }

    /// Enable or disable sync
    pub fn set_sync_enabled(&mut self, enabled: bool) -> SyncResult<()> {
        self.data.sync.enabled = enabled;
        self.save()
    }

    /// Set the debounce delay in milliseconds
    pub fn set_debounce_ms(&mut self, debounce_ms: u64) -> SyncResult<()> {
        self.data.sync.debounce_ms = debounce_ms;
        self.save()
    }

    /// Set the transfer pool size
    pub fn set_max_concurrent_transfers(&mut self, limit: usize) -> SyncResult<()> {
        if limit == 0 {
            return Err(SyncError::validation(
                "max_concurrent_transfers",
                "must be at least 1",
            ));
        }
        self.data.sync.max_concurrent_transfers = limit;
        self.save()
    }

    /// Get a configuration value
    pub fn get(&self, key: &str) -> Option<String> {
        let sync = &self.data.sync;
        match key {
            "database_file" => Some(self.data.database_file.clone()),
            "sync.enabled" => Some(sync.enabled.to_string()),
            "sync.debounce_ms" => Some(sync.debounce_ms.to_string()),
            "sync.max_concurrent_transfers" => Some(sync.max_concurrent_transfers.to_string()),
            "sync.page_size" => Some(sync.page_size.to_string()),
            "sync.drive_folder" => Some(sync.drive_folder.clone()),
            "sync.api_base_url" => Some(sync.api_base_url.clone()),
            "sync.upload_base_url" => Some(sync.upload_base_url.clone()),
            "sync.request_timeout_secs" => Some(sync.request_timeout_secs.to_string()),
            _ => None,
        }
    }

    /// Set a configuration value
    pub fn set(&mut self, key: &str, value: &str) -> SyncResult<()> {
        let sync = &mut self.data.sync;
        match key {
            "database_file" => self.data.database_file = value.to_string(),
            "sync.enabled" => sync.enabled = parse_value(key, value)?,
            "sync.debounce_ms" => sync.debounce_ms = parse_value(key, value)?,
            "sync.max_concurrent_transfers" => {
                let limit: usize = parse_value(key, value)?;
                if limit == 0 {
                    return Err(SyncError::validation(key, "must be at least 1"));
                }
                sync.max_concurrent_transfers = limit;
            }
            "sync.page_size" => sync.page_size = parse_value(key, value)?,
            "sync.drive_folder" => sync.drive_folder = value.to_string(),
            "sync.api_base_url" => sync.api_base_url = value.trim_end_matches('/').to_string(),
            "sync.upload_base_url" => {
                sync.upload_base_url = value.trim_end_matches('/').to_string()
            }
            "sync.request_timeout_secs" => sync.request_timeout_secs = parse_value(key, value)?,
            _ => return Err(SyncError::Config(format!("Unknown config key: {}", key))),
        }
        self.save()
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> SyncResult<T> {
    value
        .parse()
        .map_err(|_| SyncError::validation(key, format!("invalid value: {}", value)))
}
