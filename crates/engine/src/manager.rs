// SPDX-License-Identifier: MIT

//! Multi-run manager (§4.H). Grounded on `original_source/backend/
//! services/multi_run_service.py` plus the teacher's event-sourced
//! `MaterializedState` pattern: the durable mirror is `peft-storage`'s
//! `DurableStore`, replayed from its WAL, and this manager keeps a thin
//! in-memory index of which jobs currently have a live [`JobRuntime`] and
//! mailbox so queries can prefer the freshest view.

use crate::runtime::{JobCommand, JobRuntime};
use peft_core::{Job, JobId, JobState, TerminationReason};
use peft_storage::DurableStore;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Filter for [`RunManager::history`] (§4.H: "filter on status set,
/// provider set, date range, model name substring, or explicit job-id
/// set"). All populated fields are ANDed together.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub statuses: Option<HashSet<JobState>>,
    pub providers: Option<HashSet<String>>,
    pub started_from_ms: Option<u64>,
    pub started_to_ms: Option<u64>,
    pub model_contains: Option<String>,
    pub job_ids: Option<HashSet<JobId>>,
}

impl RunFilter {
    fn matches(&self, job: &Job) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&job.state) {
                return false;
            }
        }
        if let Some(providers) = &self.providers {
            match &job.provider {
                Some(p) if providers.contains(p) => {}
                _ => return false,
            }
        }
        if let Some(from) = self.started_from_ms {
            if !job.started_at_ms.is_some_and(|started| started >= from) {
                return false;
            }
        }
        if let Some(to) = self.started_to_ms {
            if !job.started_at_ms.is_some_and(|started| started < to) {
                return false;
            }
        }
        if let Some(substring) = &self.model_contains {
            if !job.config.base_model.contains(substring.as_str()) {
                return false;
            }
        }
        if let Some(ids) = &self.job_ids {
            if !ids.contains(&job.id) {
                return false;
            }
        }
        true
    }
}

/// §4.H `stats()`: counts by state plus per-provider active (running or
/// paused) counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub running: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
    pub per_provider_active: HashMap<String, usize>,
}

struct LiveEntry {
    runtime: Arc<JobRuntime>,
    mailbox: mpsc::Sender<JobCommand>,
}

/// Keeps a live mirror between in-memory [`JobRuntime`]s and the durable
/// store, writing through on every mutation (the write-through itself
/// happens as each runtime emits [`peft_core::Effect::Emit`] effects that
/// the host forwards into [`DurableStore::record`] — this manager's job
/// is purely the query/index surface over both).
pub struct RunManager {
    store: Arc<dyn DurableStore>,
    live: RwLock<HashMap<String, LiveEntry>>,
}

impl RunManager {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store, live: RwLock::new(HashMap::new()) }
    }

    /// Register a newly created job's runtime and command mailbox so
    /// queries see its freshest in-memory state rather than whatever the
    /// store last observed.
    pub fn register(&self, job_id: JobId, runtime: Arc<JobRuntime>, mailbox: mpsc::Sender<JobCommand>) {
        self.live.write().insert(job_id.as_str().to_string(), LiveEntry { runtime, mailbox });
    }

    fn merged(&self, job_id: &str) -> Option<Job> {
        if let Some(entry) = self.live.read().get(job_id) {
            return Some(entry.runtime.snapshot());
        }
        self.store.get(job_id)
    }

    fn all_known_ids(&self) -> HashSet<String> {
        let mut ids: HashSet<String> = self.live.read().keys().cloned().collect();
        ids.extend(self.store.list().into_iter().map(|j| j.id.as_str().to_string()));
        ids
    }

    /// Running or paused jobs, newest-started first (§4.H).
    pub fn active(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .all_known_ids()
            .iter()
            .filter_map(|id| self.merged(id))
            .filter(|j| matches!(j.state, JobState::Running | JobState::Paused))
            .collect();
        jobs.sort_by(|a, b| b.started_at_ms.cmp(&a.started_at_ms));
        jobs
    }

    /// Filtered, paginated history over every known job (active and
    /// terminal), newest-created first.
    pub fn history(&self, filter: &RunFilter, limit: usize, offset: usize) -> Vec<Job> {
        let mut jobs: Vec<Job> =
            self.all_known_ids().iter().filter_map(|id| self.merged(id)).filter(|job| filter.matches(job)).collect();
        jobs.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        jobs.into_iter().skip(offset).take(limit).collect()
    }

    pub fn stats(&self) -> RunStats {
        let mut stats = RunStats::default();
        for id in self.all_known_ids() {
            let Some(job) = self.merged(&id) else { continue };
            match job.state {
                JobState::Running => stats.running += 1,
                JobState::Paused => stats.paused += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
                _ => {}
            }
            if matches!(job.state, JobState::Running | JobState::Paused) {
                if let Some(provider) = &job.provider {
                    *stats.per_provider_active.entry(provider.clone()).or_insert(0) += 1;
                }
            }
        }
        stats
    }

    /// Merged view from in-memory (if present) and store (§4.H).
    pub fn details(&self, job_id: &str) -> Option<Job> {
        self.merged(job_id)
    }

    /// Delegates to §4.F: sends a `Stop` command to the job's mailbox if
    /// it is live. A job with no live mailbox is already terminal (or was
    /// never started in this process) and cancel is a no-op, matching
    /// §8's idempotence law for `stop`.
    pub async fn cancel(&self, job_id: &str) {
        let mailbox = self.live.read().get(job_id).map(|e| e.mailbox.clone());
        if let Some(mailbox) = mailbox {
            let _ = mailbox.send(JobCommand::Stop { reason: TerminationReason::Stopped }).await;
        }
    }

    /// Removes the in-memory entry for `job_id`; the durable record is
    /// kept for history (§4.H, §8 idempotence: unknown job_id is a no-op).
    pub fn cleanup(&self, job_id: &str) {
        self.live.write().remove(job_id);
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
