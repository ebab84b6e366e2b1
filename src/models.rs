//! Data models for the sync engine.
//!
//! A `Note` is replicated as one JSON file per note, named `<id>.json`.
//! Only `id`, `timestamp` and the tombstone/exclusion flags mean anything to
//! the engine; every other field is an opaque payload passed through as-is.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// File extension of remote note files
pub const NOTE_FILE_EXTENSION: &str = "json";

/// A captured memory plus its sync metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Stable identifier, immutable for the note's lifetime
    pub id: String,
    /// Epoch milliseconds of the last write, by whichever side wrote it
    pub timestamp: i64,
    /// Tombstone flag (soft delete)
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_deleted: bool,
    /// Seed/demo content, never synced
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_sample: bool,
    /// Enrichment still in flight, not synced until cleared
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_pending: bool,
    /// Enrichment failure marker, not synced until cleared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<Value>,
    /// Content, tags, attachments, location, enrichment...
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Note {
    /// Create a new live note with the given content
    pub fn new(content: impl Into<String>) -> Self {
        let mut payload = Map::new();
        payload.insert("content".to_string(), Value::String(content.into()));
        Self {
            id: Uuid::now_v7().to_string(),
            timestamp: Utc::now().timestamp_millis(),
            is_deleted: false,
            is_sample: false,
            is_pending: false,
            processing_error: None,
            payload,
        }
    }

    /// Create a note with an explicit id and timestamp and no payload
    pub fn with_id(id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            timestamp,
            is_deleted: false,
            is_sample: false,
            is_pending: false,
            processing_error: None,
            payload: Map::new(),
        }
    }

    /// The note's text content, if any
    pub fn content(&self) -> Option<&str> {
        self.payload.get("content").and_then(Value::as_str)
    }

    /// Mark the note deleted at the given time
    pub fn mark_deleted(&mut self, timestamp: i64) {
        self.is_deleted = true;
        self.timestamp = timestamp;
    }

    /// Check whether enrichment failed for this note
    pub fn has_processing_error(&self) -> bool {
        match &self.processing_error {
            None | Some(Value::Null) | Some(Value::Bool(false)) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// Whether the sync engine may see this note at all.
    ///
    /// Sample, pending and failed-enrichment notes are skipped in both
    /// directions until their flags clear.
    pub fn is_syncable(&self) -> bool {
        !self.is_sample && !self.is_pending && !self.has_processing_error()
    }

    /// Remote file name for this note
    pub fn file_name(&self) -> String {
        note_file_name(&self.id)
    }
}

/// Remote file name for a note id: `<id>.json`
pub fn note_file_name(note_id: &str) -> String {
    format!("{}.{}", note_id, NOTE_FILE_EXTENSION)
}

/// Extract the note id from a remote file name, if it follows `<id>.json`
pub fn note_id_from_file_name(name: &str) -> Option<&str> {
    let stem = name.strip_suffix(NOTE_FILE_EXTENSION)?.strip_suffix('.')?;
    if stem.is_empty() {
        None
    } else {
        Some(stem)
    }
}

/// A file in the app-private remote folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Provider-assigned identifier
    #[serde(rename = "id")]
    pub remote_id: String,
    /// File name, `<note id>.json` for note files
    pub name: String,
    /// Provider-assigned revision time, changes on every upload
    pub modified_time: String,
}

impl RemoteFile {
    pub fn new(
        remote_id: impl Into<String>,
        name: impl Into<String>,
        modified_time: impl Into<String>,
    ) -> Self {
        Self {
            remote_id: remote_id.into(),
            name: name.into(),
            modified_time: modified_time.into(),
        }
    }

    /// The note id encoded in the file name
    pub fn note_id(&self) -> Option<&str> {
        note_id_from_file_name(&self.name)
    }
}
