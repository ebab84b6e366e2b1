//! Input validation for notes and remote file names.
//!
//! All validators return `SyncError::Validation` on failure.

use crate::error::{SyncError, SyncResult};
use crate::models::{note_id_from_file_name, Note};

/// Longest note id accepted; file names must stay well under provider limits
pub const MAX_NOTE_ID_LENGTH: usize = 200;

/// Validate a note id.
///
/// Ids become remote file name stems, so they must be non-empty, bounded
/// and free of path separators and control characters.
pub fn validate_note_id(id: &str) -> SyncResult<()> {
    if id.is_empty() {
        return Err(SyncError::validation("id", "note id must not be empty"));
    }
    if id.len() > MAX_NOTE_ID_LENGTH {
        return Err(SyncError::validation(
            "id",
            format!(
                "note id must be at most {} bytes, got {}",
                MAX_NOTE_ID_LENGTH,
                id.len()
            ),
        ));
    }
    if id.trim() != id {
        return Err(SyncError::validation(
            "id",
            "note id must not have leading or trailing whitespace",
        ));
    }
    if let Some(c) = id
        .chars()
        .find(|c| *c == '/' || *c == '\\' || c.is_control())
    {
        return Err(SyncError::validation(
            "id",
            format!("note id contains invalid character {:?}", c),
        ));
    }
    Ok(())
}

/// Validate a note before it is written locally or uploaded
pub fn validate_note(note: &Note) -> SyncResult<()> {
    validate_note_id(&note.id)?;
    if note.timestamp < 0 {
        return Err(SyncError::validation(
            "timestamp",
            "timestamp must not be negative",
        ));
    }
    Ok(())
}

/// Check that downloaded content belongs to the file it was read from.
///
/// A mismatch means the remote folder holds a renamed or corrupted file;
/// applying it would write one note's content under another note's id.
pub fn validate_downloaded_note(file_name: &str, note: &Note) -> SyncResult<()> {
    validate_note(note)?;
    match note_id_from_file_name(file_name) {
        Some(expected) if expected == note.id => Ok(()),
        Some(expected) => Err(SyncError::validation(
            "id",
            format!(
                "file {} contains note {} instead of {}",
                file_name, note.id, expected
            ),
        )),
        None => Err(SyncError::validation(
            "name",
            format!("{} is not a note file name", file_name),
        )),
    }
}
