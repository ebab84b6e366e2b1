//! Sync controller: the entry point the application talks to.
//!
//! The controller owns the pass lifecycle:
//! - debounces bursts of triggers into a single pass
//! - guarantees at most one pass in flight (triggers while running are dropped)
//! - checks for a bearer token before touching the network
//! - chooses full or delta reconciliation
//! - maps pass outcomes to a user-facing error
//!
//! It also offers a single-note fast path that bypasses planning.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Mutex as AsyncMutex;

use crate::auth::AccessTokenProvider;
use crate::config::SyncConfig;
use crate::error::{SyncFailure, SyncResult};
use crate::executor::{execute_plan, ExecuteOptions, PassReport, SyncMode};
use crate::file_storage::RemoteFileGateway;
use crate::models::Note;
use crate::planner::{plan_delta, plan_full};
use crate::store::{NoteStore, SnapshotStore};

/// Lifecycle of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    /// A debounce timer is pending
    Debouncing,
    /// A pass is in flight
    Running,
}

#[derive(Debug)]
struct ControllerState {
    phase: SyncState,
    /// Bumped on every timer (re)start; stale timers compare and exit
    generation: u64,
    /// Some trigger in the current burst asked for a full pass
    pending_full: bool,
    last_error: Option<SyncFailure>,
    last_report: Option<PassReport>,
}

/// Drives sync passes for one local store and one remote folder.
pub struct SyncController<G, A, S> {
    gateway: G,
    auth: A,
    store: Arc<S>,
    config: SyncConfig,
    state: Mutex<ControllerState>,
    /// Held for the whole of a pass or a single-note sync so the two never
    /// interleave their remote lookups and writes
    remote_writes: AsyncMutex<()>,
}

impl<G, A, S> SyncController<G, A, S>
where
    G: RemoteFileGateway + 'static,
    A: AccessTokenProvider + 'static,
    S: NoteStore + SnapshotStore + Send + Sync + 'static,
{
    /// Create a new sync controller
    pub fn new(gateway: G, auth: A, store: Arc<S>, config: SyncConfig) -> Self {
        Self {
            gateway,
            auth,
            store,
            config,
            state: Mutex::new(ControllerState {
                phase: SyncState::Idle,
                generation: 0,
                pending_full: false,
                last_error: None,
                last_report: None,
            }),
            remote_writes: AsyncMutex::new(()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SyncState {
        self.lock_state().phase
    }

    /// The error recorded by the last pass, if it failed
    pub fn last_error(&self) -> Option<SyncFailure> {
        self.lock_state().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.lock_state().last_error = None;
    }

    /// Report of the last pass that got as far as executing a plan
    pub fn last_report(&self) -> Option<PassReport> {
        self.lock_state().last_report.clone()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Request a pass after the debounce delay.
    ///
    /// Each call restarts the timer, so a burst of edits produces one pass.
    /// Ignored while a pass is running and when sync is disabled. Must be
    /// called from within a tokio runtime.
    pub fn sync(self: &Arc<Self>, force_full: bool) {
        if !self.config.enabled {
            tracing::debug!("Sync disabled, trigger ignored");
            return;
        }

        let generation = {
            let mut state = self.lock_state();
            if state.phase == SyncState::Running {
                tracing::debug!("Sync pass in flight, trigger dropped");
                return;
            }
            state.phase = SyncState::Debouncing;
            state.generation += 1;
            state.pending_full |= force_full;
            state.generation
        };

        let controller = Arc::clone(self);
        let delay = self.config.debounce();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            controller.fire(generation).await;
        });
    }

    async fn fire(&self, generation: u64) {
        let force_full = {
            let mut state = self.lock_state();
            if state.generation != generation || state.phase != SyncState::Debouncing {
                return;
            }
            state.phase = SyncState::Running;
            std::mem::take(&mut state.pending_full)
        };

        let result = self.run_pass(force_full).await;
        self.finish(&result);
    }

    /// Run a pass immediately, skipping the debounce.
    ///
    /// Returns `None` when a pass is already running. A pending debounce
    /// timer is cancelled and its full-pass request carried over.
    pub async fn sync_now(&self, force_full: bool) -> Option<SyncResult<PassReport>> {
        let force_full = {
            let mut state = self.lock_state();
            if state.phase == SyncState::Running {
                tracing::debug!("Sync pass in flight, sync_now ignored");
                return None;
            }
            state.phase = SyncState::Running;
            state.generation += 1;
            force_full || std::mem::take(&mut state.pending_full)
        };

        let result = self.run_pass(force_full).await;
        self.finish(&result);
        Some(result)
    }

    async fn run_pass(&self, force_full: bool) -> SyncResult<PassReport> {
        let _writes = self.remote_writes.lock().await;

        // Fail fast when the user has to reconnect
        self.auth.access_token().await?;

        let snapshot = self.store.load_snapshot()?;
        let mode = if force_full || !snapshot.exists() {
            SyncMode::Full
        } else {
            SyncMode::Delta
        };
        let options = ExecuteOptions::new(mode, self.config.transfer_limit());

        let local = self.store.get_all()?;
        let remote = self.gateway.list_files().await?;
        let plan = match mode {
            SyncMode::Full => plan_full(&local, &remote),
            SyncMode::Delta => plan_delta(&local, &remote, &snapshot),
        };

        tracing::info!(
            mode = %mode,
            local = local.len(),
            remote = remote.len(),
            plan = %plan.summary(),
            "Starting sync pass"
        );

        execute_plan(plan, &self.gateway, &*self.store, &*self.store, options).await
    }

    fn finish(&self, result: &SyncResult<PassReport>) {
        if let Err(e) = result {
            tracing::error!(error = %e, category = %e.category(), "Sync pass failed");
        }

        let mut state = self.lock_state();
        state.phase = SyncState::Idle;
        match result {
            Ok(report) => {
                state.last_error = report.failure();
                state.last_report = Some(report.clone());
            }
            Err(e) => state.last_error = Some(SyncFailure::from(e)),
        }
    }

    /// Push one note straight to the remote folder, bypassing the planner.
    ///
    /// Live notes are created or replaced; tombstones have their remote file
    /// deleted and are then purged locally. The note's snapshot entry is kept
    /// in step; the last sync time is not touched, so the next delta pass
    /// uploads a live note once more since its timestamp is still newer.
    ///
    /// Waits for a pass in flight to finish before looking up the remote file.
    pub async fn sync_file(&self, note: &Note) -> SyncResult<()> {
        if !note.is_syncable() {
            tracing::debug!(note_id = %note.id, "Note excluded from sync");
            return Ok(());
        }

        let _writes = self.remote_writes.lock().await;

        self.auth.access_token().await?;

        let name = note.file_name();
        let existing = self.gateway.find_file(&name).await?;

        if note.is_deleted {
            if let Some(file) = &existing {
                self.gateway.delete(&file.remote_id).await?;
            }
            self.store.delete(&note.id)?;

            let mut snapshot = self.store.load_snapshot()?;
            if snapshot.forget(&note.id) {
                self.store.save_snapshot(&snapshot)?;
            }
            tracing::info!(
                note_id = %note.id,
                had_remote = existing.is_some(),
                "Deleted single note"
            );
        } else {
            let file = self
                .gateway
                .upload(&name, note, existing.as_ref().map(|f| f.remote_id.as_str()))
                .await?;

            let mut snapshot = self.store.load_snapshot()?;
            snapshot.record(note.id.as_str(), file.modified_time);
            self.store.save_snapshot(&snapshot)?;
            tracing::info!(
                note_id = %note.id,
                created = existing.is_none(),
                "Synced single note"
            );
        }

        Ok(())
    }
}
