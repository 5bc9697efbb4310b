// SPDX-License-Identifier: MIT

//! In-memory materialized view rebuilt by replaying [`Event`]s (§4.H).
//! Generalized from the teacher's `oj-daemon::storage::state::MaterializedState`,
//! which folds its own worker/queue/cron events into flat maps the same way.

use peft_core::{Event, Job, JobId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The full set of jobs as reconstructed from a [`crate::wal::Wal`] (or a
/// snapshot plus the WAL tail following it). Holds no state the events
/// themselves don't carry — replaying the same event log twice always
/// yields the same map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterializedState {
    jobs: HashMap<String, Job>,
}

impl MaterializedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, job_id: &str) -> Option<&Job> {
        self.jobs.get(job_id)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Fold a single event into the map. Unknown job ids for anything but
    /// `JobCreated` are silently ignored rather than treated as corruption —
    /// a truncated log (see [`crate::wal::Wal::truncate_before`]) can legally
    /// start mid-stream relative to a job that was already terminal at
    /// snapshot time.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::JobCreated { job_id, config, created_at_ms } => {
                self.jobs
                    .entry(job_id.as_str().to_string())
                    .or_insert_with(|| Job::new(job_id.clone(), config.clone(), *created_at_ms));
            }
            Event::JobTransitioned { job_id, to, at_ms } => {
                if let Some(job) = self.job_mut(job_id) {
                    job.transition(*to, *at_ms);
                }
            }
            Event::MetricsIngested { job_id, sample } => {
                if let Some(job) = self.job_mut(job_id) {
                    let _ = job.metrics_history.push(sample.clone());
                    job.current_metrics = Some(sample.clone());
                }
            }
            Event::AnomalyDetected { .. } => {
                // Anomalies drive recovery actions in `peft_engine::runtime` but
                // carry no durable field on `Job` itself; nothing to replay.
            }
            Event::NotificationSent { job_id, notification } => {
                if let Some(job) = self.job_mut(job_id) {
                    job.notifications.push(notification.clone());
                }
            }
            Event::CheckpointWritten { job_id, handle } => {
                if let Some(job) = self.job_mut(job_id) {
                    job.checkpoint_handle = Some(handle.clone());
                }
            }
            Event::ArtifactRecorded { job_id, artifact } => {
                if let Some(job) = self.job_mut(job_id) {
                    job.artifact_info = Some(artifact.clone());
                }
            }
            Event::QualityAnalysisRecorded { job_id, analysis } => {
                if let Some(job) = self.job_mut(job_id) {
                    job.quality_analysis = Some(analysis.clone());
                }
            }
            Event::ErrorRecorded { job_id, message, .. } => {
                if let Some(job) = self.job_mut(job_id) {
                    job.error_message = Some(message.clone());
                }
            }
        }
    }

    fn job_mut(&mut self, job_id: &JobId) -> Option<&mut Job> {
        self.jobs.get_mut(job_id.as_str())
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
