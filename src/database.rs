//! SQLite persistence for notes and sync state.
//!
//! Notes are stored whole as JSON keyed by id, with `timestamp` and
//! `is_deleted` mirrored into columns for inspection. Sync state lives in a
//! small key/value table: the snapshot map under `sync_snapshot` and the
//! last sync time under `last_sync_time`.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::SyncResult;
use crate::models::Note;
use crate::snapshot::{SyncSnapshot, LAST_SYNC_TIME_KEY, SNAPSHOT_KEY};
use crate::store::{NoteStore, SnapshotStore};
use crate::validation::validate_note;

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database file
    pub fn new<P: AsRef<Path>>(db_path: P) -> SyncResult<Self> {
        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let db = Self { conn };
        db.init_database()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn new_in_memory() -> SyncResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_database()?;
        Ok(db)
    }

    /// Initialize database schema
    pub fn init_database(&self) -> SyncResult<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                id TEXT PRIMARY KEY,
                timestamp INTEGER NOT NULL,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sync_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_notes_timestamp ON notes (timestamp);
            "#,
        )?;
        Ok(())
    }

    /// Get the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Get a note by id
    pub fn get_note(&self, id: &str) -> SyncResult<Option<Note>> {
        let data: Option<String> = self
            .conn
            .query_row("SELECT data FROM notes WHERE id = ?", [id], |row| row.get(0))
            .optional()?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Get all notes ordered by id
    pub fn get_all_notes(&self) -> SyncResult<Vec<Note>> {
        let mut stmt = self.conn.prepare("SELECT data FROM notes ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut notes = Vec::new();
        for row in rows {
            notes.push(serde_json::from_str(&row?)?);
        }
        Ok(notes)
    }

    /// Insert or replace a note
    pub fn save_note(&self, note: &Note) -> SyncResult<()> {
        validate_note(note)?;
        let data = serde_json::to_string(note)?;
        self.conn.execute(
            "INSERT INTO notes (id, timestamp, is_deleted, data) VALUES (?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET timestamp = excluded.timestamp, \
             is_deleted = excluded.is_deleted, data = excluded.data",
            params![note.id, note.timestamp, note.is_deleted, data],
        )?;
        Ok(())
    }

    /// Permanently remove a note, returning whether it existed
    pub fn delete_note(&self, id: &str) -> SyncResult<bool> {
        let deleted = self.conn.execute("DELETE FROM notes WHERE id = ?", [id])?;
        Ok(deleted > 0)
    }

    /// Count stored notes, tombstones included
    pub fn count_notes(&self) -> SyncResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?)
    }

    /// Read a sync state value
    pub fn get_state(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM sync_state WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    /// Write a sync state value
    pub fn set_state(&self, key: &str, value: &str) -> SyncResult<()> {
        self.conn.execute(
            "INSERT INTO sync_state (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Remove all sync state, forcing the next pass to be a full one
    pub fn clear_sync_state(&self) -> SyncResult<()> {
        self.conn.execute("DELETE FROM sync_state", [])?;
        Ok(())
    }
}

impl NoteStore for Database {
    fn get_all(&self) -> SyncResult<Vec<Note>> {
        self.get_all_notes()
    }

    fn save(&self, note: &Note) -> SyncResult<()> {
        self.save_note(note)
    }

    fn delete(&self, id: &str) -> SyncResult<()> {
        self.delete_note(id).map(|_| ())
    }
}

impl SnapshotStore for Database {
    fn load_snapshot(&self) -> SyncResult<SyncSnapshot> {
        let entries = self.get_state(SNAPSHOT_KEY)?;
        let last_sync_time = self.get_state(LAST_SYNC_TIME_KEY)?;
        SyncSnapshot::decode(entries.as_deref(), last_sync_time.as_deref())
    }

    fn save_snapshot(&self, snapshot: &SyncSnapshot) -> SyncResult<()> {
        let entries = snapshot.entries_json()?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO sync_state (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![SNAPSHOT_KEY, entries],
        )?;
        match snapshot.last_sync_time_string() {
            Some(time) => {
                tx.execute(
                    "INSERT INTO sync_state (key, value) VALUES (?, ?) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![LAST_SYNC_TIME_KEY, time],
                )?;
            }
            None => {
                tx.execute(
                    "DELETE FROM sync_state WHERE key = ?",
                    [LAST_SYNC_TIME_KEY],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
