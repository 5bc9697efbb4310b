//! Summary/detail DTOs sent across the IPC boundary. `JobDetail` is the
//! full `peft_core::Job`; `JobSummary` is the lighter projection used for
//! list views so a `history`/`active` response doesn't ship every job's
//! full metrics history over the wire.

use peft_core::{Artifact, Checkpoint, Job, JobId, JobState};
use serde::{Deserialize, Serialize};

pub type JobDetail = Job;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub state: JobState,
    pub provider: Option<String>,
    pub base_model: String,
    pub created_at_ms: u64,
    pub started_at_ms: Option<u64>,
    pub current_step: Option<u64>,
    pub current_loss: Option<f64>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            state: job.state,
            provider: job.provider.clone(),
            base_model: job.config.base_model.clone(),
            created_at_ms: job.created_at_ms,
            started_at_ms: job.started_at_ms,
            current_step: job.current_metrics.as_ref().map(|s| s.step),
            current_loss: job.current_metrics.as_ref().map(|s| s.loss),
        }
    }
}

/// Wire-local mirror of `peft_engine::manager::RunFilter`. `peft-wire`
/// does not depend on `peft-engine`, so the daemon translates between the
/// two at the IPC boundary (§6).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryFilter {
    #[serde(default)]
    pub statuses: Vec<JobState>,
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default)]
    pub started_from_ms: Option<u64>,
    #[serde(default)]
    pub started_to_ms: Option<u64>,
    #[serde(default)]
    pub model_contains: Option<String>,
    #[serde(default)]
    pub job_ids: Vec<JobId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatsDto {
    pub running: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
    pub per_provider_active: std::collections::HashMap<String, usize>,
}

pub type CheckpointDto = Checkpoint;
pub type ArtifactDto = Artifact;

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
