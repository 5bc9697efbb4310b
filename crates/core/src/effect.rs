// SPDX-License-Identifier: MIT

//! Effects represent side effects `peft_engine::runtime::JobRuntime` asks
//! its host to perform (§4.F, §4.G). Generalized from the teacher's
//! `oj-core::effect::Effect`.

use crate::checkpoint::Checkpoint;
use crate::config::Config;
use crate::event::Event;
use crate::job::JobId;
use crate::notification::Notification;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    /// Emit an event into the durable event log.
    Emit { event: Event },

    /// Submit a job to its configured backend via `peft-connectors`.
    SubmitJob { job_id: JobId, config: Config },

    /// Poll a provider-backed job's status (§4.G: default 10s interval).
    PollProviderStatus { job_id: JobId, provider: String, provider_job_id: String },

    /// Request cancellation of a provider-backed job.
    CancelProviderJob { job_id: JobId, provider: String, provider_job_id: String },

    /// Persist a checkpoint to the checkpoint store.
    WriteCheckpoint { job_id: JobId, checkpoint: Checkpoint },

    /// Download and hash the final artifact for a completed provider job.
    DownloadArtifact { job_id: JobId, provider: String, provider_job_id: String },

    /// Dispatch a desktop notification, subject to do-not-disturb.
    SendNotification { job_id: JobId, notification: Notification },

    /// Arm the status-poll timer for a job.
    SetPollTimer { job_id: JobId, duration: Duration },

    /// Disarm a job's status-poll timer.
    CancelPollTimer { job_id: JobId },
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Emit { .. } => "emit",
            Effect::SubmitJob { .. } => "submit_job",
            Effect::PollProviderStatus { .. } => "poll_provider_status",
            Effect::CancelProviderJob { .. } => "cancel_provider_job",
            Effect::WriteCheckpoint { .. } => "write_checkpoint",
            Effect::DownloadArtifact { .. } => "download_artifact",
            Effect::SendNotification { .. } => "send_notification",
            Effect::SetPollTimer { .. } => "set_poll_timer",
            Effect::CancelPollTimer { .. } => "cancel_poll_timer",
        }
    }

    /// Key-value pairs for structured logging.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Effect::Emit { event } => vec![("event", event.log_summary())],
            Effect::SubmitJob { job_id, config } => {
                vec![("job_id", job_id.to_string()), ("base_model", config.base_model.clone())]
            }
            Effect::PollProviderStatus { job_id, provider, provider_job_id } => vec![
                ("job_id", job_id.to_string()),
                ("provider", provider.clone()),
                ("provider_job_id", provider_job_id.clone()),
            ],
            Effect::CancelProviderJob { job_id, provider, .. } => {
                vec![("job_id", job_id.to_string()), ("provider", provider.clone())]
            }
            Effect::WriteCheckpoint { job_id, checkpoint } => {
                vec![("job_id", job_id.to_string()), ("step", checkpoint.step.to_string())]
            }
            Effect::DownloadArtifact { job_id, provider, .. } => {
                vec![("job_id", job_id.to_string()), ("provider", provider.clone())]
            }
            Effect::SendNotification { job_id, notification } => {
                vec![("job_id", job_id.to_string()), ("kind", notification.kind.to_string())]
            }
            Effect::SetPollTimer { job_id, duration } => {
                vec![("job_id", job_id.to_string()), ("duration_ms", duration.as_millis().to_string())]
            }
            Effect::CancelPollTimer { job_id } => vec![("job_id", job_id.to_string())],
        }
    }

    /// Whether to log both "started" and "completed", or just "executed",
    /// mirroring the teacher's verbosity split for frequent effects.
    pub fn verbose(&self) -> bool {
        !matches!(self, Effect::Emit { .. } | Effect::SetPollTimer { .. } | Effect::CancelPollTimer { .. })
    }
}

#[cfg(test)]
#[path = "effect_tests.rs"]
mod tests;
