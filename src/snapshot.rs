//! The sync snapshot: remote `modifiedTime` per note as of the last
//! successful pass, plus the time that pass started.
//!
//! The snapshot is the engine's only durable state besides the notes. Delta
//! passes compare the current remote listing against it to skip files that
//! have not changed since the last pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::models::RemoteFile;

/// Key under which the id → modifiedTime map is persisted
pub const SNAPSHOT_KEY: &str = "sync_snapshot";

/// Key under which the last sync time (epoch ms) is persisted
pub const LAST_SYNC_TIME_KEY: &str = "last_sync_time";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    /// note id → remote modifiedTime
    pub entries: BTreeMap<String, String>,
    /// Epoch ms of the last completed pass, `None` before the first one
    pub last_sync_time: Option<i64>,
}

impl SyncSnapshot {
    /// Build a snapshot from a complete remote listing.
    ///
    /// Files that are not note files are left out. When several files carry
    /// the same note name the first listed one is recorded, matching the
    /// copy the planner compares against.
    pub fn from_listing(files: &[RemoteFile], last_sync_time: i64) -> Self {
        let mut entries = BTreeMap::new();
        for file in files {
            if let Some(id) = file.note_id() {
                entries
                    .entry(id.to_string())
                    .or_insert_with(|| file.modified_time.clone());
            }
        }
        Self {
            entries,
            last_sync_time: Some(last_sync_time),
        }
    }

    /// Whether a pass has ever completed
    pub fn exists(&self) -> bool {
        self.last_sync_time.is_some()
    }

    pub fn get(&self, note_id: &str) -> Option<&str> {
        self.entries.get(note_id).map(String::as_str)
    }

    pub fn contains(&self, note_id: &str) -> bool {
        self.entries.contains_key(note_id)
    }

    /// Record the remote revision last observed for a note
    pub fn record(&mut self, note_id: impl Into<String>, modified_time: impl Into<String>) {
        self.entries.insert(note_id.into(), modified_time.into());
    }

    /// Drop a note's entry, returning whether it was present
    pub fn forget(&mut self, note_id: &str) -> bool {
        self.entries.remove(note_id).is_some()
    }

    /// Whether a listed file differs from what the last pass observed
    pub fn is_changed(&self, note_id: &str, modified_time: &str) -> bool {
        self.get(note_id) != Some(modified_time)
    }

    /// Encode the entry map as the persisted JSON object
    pub fn entries_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string(&self.entries)?)
    }

    /// Encode the last sync time as the persisted epoch-ms string
    pub fn last_sync_time_string(&self) -> Option<String> {
        self.last_sync_time.map(|t| t.to_string())
    }

    /// Decode the persisted key/value pair
    pub fn decode(entries_json: Option<&str>, last_sync_time: Option<&str>) -> SyncResult<Self> {
        let entries = match entries_json {
            Some(json) => serde_json::from_str(json)?,
            None => BTreeMap::new(),
        };
        let last_sync_time = match last_sync_time {
            Some(raw) => Some(raw.trim().parse::<i64>().map_err(|_| {
                SyncError::validation(LAST_SYNC_TIME_KEY, format!("not an epoch: {}", raw))
            })?),
            None => None,
        };
        Ok(Self {
            entries,
            last_sync_time,
        })
    }
}
