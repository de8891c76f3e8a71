//! Per-manager runtime state.
//!
//! [`ManagerState`] carries everything that must outlive AgentConfig
//! swaps: the last-run timestamp, the known-good snapshot, the
//! `reload_pending` marker, and the guard that keeps one manager's syncs
//! from overlapping. The controller keys these by manager name.

pub mod sync;

use std::sync::Mutex;
use std::time::SystemTime;

use crate::cache::Snapshot;

pub struct ManagerState {
    name: String,
    sync_guard: tokio::sync::Mutex<()>,
    runtime: Mutex<Runtime>,
}

#[derive(Default)]
struct Runtime {
    last_run: Option<SystemTime>,
    good_cache: bool,
    reload_pending: bool,
    snapshot: Snapshot,
}

impl ManagerState {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sync_guard: tokio::sync::Mutex::new(()),
            runtime: Mutex::new(Runtime::default()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Claim the sync guard without waiting. `None` means a prior tick's
    /// sync is still running and this tick must be skipped.
    pub fn try_begin_sync(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        self.sync_guard.try_lock().ok()
    }

    #[must_use]
    pub fn reload_pending(&self) -> bool {
        self.runtime.lock().expect("runtime lock").reload_pending
    }

    pub fn set_reload_pending(&self, pending: bool) {
        self.runtime.lock().expect("runtime lock").reload_pending = pending;
    }

    /// `true` iff a snapshot exists that was successfully reloaded at
    /// least once.
    #[must_use]
    pub fn good_cache(&self) -> bool {
        self.runtime.lock().expect("runtime lock").good_cache
    }

    /// Install a new known-good snapshot. Only called after a successful
    /// reload, so this also flips `good_cache`.
    pub fn store_snapshot(&self, snapshot: Snapshot) {
        let mut runtime = self.runtime.lock().expect("runtime lock");
        runtime.snapshot = snapshot;
        runtime.good_cache = true;
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.runtime.lock().expect("runtime lock").snapshot.clone()
    }

    pub fn mark_run(&self) {
        self.runtime.lock().expect("runtime lock").last_run = Some(SystemTime::now());
    }

    #[must_use]
    pub fn last_run(&self) -> Option<SystemTime> {
        self.runtime.lock().expect("runtime lock").last_run
    }
}
