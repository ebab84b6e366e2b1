//! Local persistence seams used by the sync engine.
//!
//! `NoteStore` is the on-device note collection, `SnapshotStore` the durable
//! sync snapshot. `Database` implements both on SQLite; the engine only
//! talks to these traits and shares a store as `Arc<Mutex<Database>>`.

use std::sync::{Mutex, MutexGuard};

use crate::error::{SyncError, SyncResult};
use crate::models::Note;
use crate::snapshot::SyncSnapshot;

/// Key-value store of notes keyed by note id, tombstones included.
pub trait NoteStore {
    /// Every note, including tombstones and excluded notes
    fn get_all(&self) -> SyncResult<Vec<Note>>;

    /// Insert or replace a note by id
    fn save(&self, note: &Note) -> SyncResult<()>;

    /// Hard purge; deleting an unknown id is not an error
    fn delete(&self, id: &str) -> SyncResult<()>;
}

/// Durable storage for the sync snapshot.
pub trait SnapshotStore {
    /// The last saved snapshot, empty before the first successful pass
    fn load_snapshot(&self) -> SyncResult<SyncSnapshot>;

    /// Replace the stored snapshot atomically
    fn save_snapshot(&self, snapshot: &SyncSnapshot) -> SyncResult<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> SyncResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| SyncError::Other("local store lock poisoned".to_string()))
}

impl<T: NoteStore + Send> NoteStore for Mutex<T> {
    fn get_all(&self) -> SyncResult<Vec<Note>> {
        lock(self)?.get_all()
    }

    fn save(&self, note: &Note) -> SyncResult<()> {
        lock(self)?.save(note)
    }

    fn delete(&self, id: &str) -> SyncResult<()> {
        lock(self)?.delete(id)
    }
}

impl<T: SnapshotStore + Send> SnapshotStore for Mutex<T> {
    fn load_snapshot(&self) -> SyncResult<SyncSnapshot> {
        lock(self)?.load_snapshot()
    }

    fn save_snapshot(&self, snapshot: &SyncSnapshot) -> SyncResult<()> {
        lock(self)?.save_snapshot(snapshot)
    }
}
