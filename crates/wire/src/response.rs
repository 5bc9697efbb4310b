// SPDX-License-Identifier: MIT

//! Responses `peftd` sends back over the IPC socket (§6).

use crate::types::{ArtifactDto, CheckpointDto, JobDetail, JobSummary, RunStatsDto};
use peft_core::{ConnectorRecord, CoreError, MetricsSample, Notification};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Ok,
    Job { job: JobDetail },
    JobSummaries { jobs: Vec<JobSummary> },
    Checkpoint { checkpoint: CheckpointDto },
    Artifact { artifact: Option<ArtifactDto> },
    Stats { stats: RunStatsDto },
    Connectors { connectors: Vec<ConnectorRecord> },

    /// One framed push on a [`crate::Request::SubscribeMetrics`]
    /// connection; the stream ends when the sender closes it.
    MetricsSample { job_id: String, sample: MetricsSample },
    /// One framed push on a [`crate::Request::SubscribeNotifications`]
    /// connection.
    NotificationSent { job_id: String, notification: Notification },
    /// Sentinel frame closing out a subscription stream once the job
    /// reaches a terminal state, so a client loop can stop reading
    /// without relying on connection reset alone.
    StreamEnded { job_id: String },

    Error {
        #[serde(default)]
        kind: String,
        message: String,
        #[serde(default)]
        suggested_actions: Vec<SuggestedActionDto>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        help_link: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedActionDto {
    pub description: String,
    pub automatic: bool,
}

impl From<&CoreError> for Response {
    fn from(err: &CoreError) -> Self {
        Response::Error {
            kind: err.kind.to_string(),
            message: err.message.clone(),
            suggested_actions: err
                .suggested_actions
                .iter()
                .map(|a| SuggestedActionDto { description: a.description.clone(), automatic: a.automatic })
                .collect(),
            help_link: err.help_link.clone(),
        }
    }
}

impl From<CoreError> for Response {
    fn from(err: CoreError) -> Self {
        Response::from(&err)
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
