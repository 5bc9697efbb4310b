// SPDX-License-Identifier: MIT

//! Durable, queryable job store (§4.H: "atomic row upserts and indexed
//! range queries on `started_at`"). Grounded on the teacher's
//! `oj-daemon::storage` split between a WAL and a materialized view,
//! minus the teacher's sqlite-backed snapshot loader — this kernel keeps
//! the whole materialized state in memory and relies on the WAL plus
//! periodic [`crate::snapshot`]s for durability instead of a SQL engine.

use crate::state::MaterializedState;
use crate::wal::{Wal, WalError};
use parking_lot::{Mutex, RwLock};
use peft_core::{Event, Job};
use std::path::Path;

/// Read/write surface the rest of the kernel depends on, independent of
/// whether the events are actually backed by a flat-file WAL or something
/// else in a future deployment.
pub trait DurableStore: Send + Sync {
    /// Append `event` to the log and fold it into the in-memory view as a
    /// single atomic step — a reader never observes the WAL write without
    /// the materialized state, or vice versa.
    fn record(&self, event: Event) -> Result<(), WalError>;

    fn get(&self, job_id: &str) -> Option<Job>;

    fn list(&self) -> Vec<Job>;

    /// Jobs whose `started_at_ms` falls in `[from, to)`. Jobs that never
    /// started (still `Created`) are excluded, not treated as `0`.
    fn range_by_started_at(&self, from: u64, to: u64) -> Vec<Job>;
}

/// [`DurableStore`] backed by a single [`Wal`] file plus an in-memory
/// [`MaterializedState`] kept in lockstep with it.
pub struct WalDurableStore {
    wal: Mutex<Wal>,
    state: RwLock<MaterializedState>,
}

impl WalDurableStore {
    /// Open (or create) the WAL at `path` and replay every entry in it to
    /// rebuild the materialized state before returning.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WalError> {
        let mut wal = Wal::open(path, 0)?;
        let mut state = MaterializedState::new();
        for entry in wal.entries_after(0)? {
            state.apply(&entry.event);
            wal.mark_processed(entry.seq);
        }
        Ok(Self { wal: Mutex::new(wal), state: RwLock::new(state) })
    }

    /// Force a flush of the underlying WAL regardless of [`Wal::needs_flush`].
    pub fn flush(&self) -> Result<(), WalError> {
        self.wal.lock().flush()
    }
}

impl DurableStore for WalDurableStore {
    fn record(&self, event: Event) -> Result<(), WalError> {
        let mut wal = self.wal.lock();
        let seq = wal.append(&event)?;
        if wal.needs_flush() {
            wal.flush()?;
        }
        wal.mark_processed(seq);
        drop(wal);

        self.state.write().apply(&event);
        Ok(())
    }

    fn get(&self, job_id: &str) -> Option<Job> {
        self.state.read().get(job_id).cloned()
    }

    fn list(&self) -> Vec<Job> {
        self.state.read().jobs().cloned().collect()
    }

    fn range_by_started_at(&self, from: u64, to: u64) -> Vec<Job> {
        self.state
            .read()
            .jobs()
            .filter(|job| job.started_at_ms.is_some_and(|started| started >= from && started < to))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "durable_store_tests.rs"]
mod tests;
