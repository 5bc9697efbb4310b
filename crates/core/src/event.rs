// SPDX-License-Identifier: MIT

//! Events record facts the materialized state replays from (§3.1,
//! §4.F). Generalized from the teacher's `oj-core` event/effect duality:
//! the job state machine never mutates a [`crate::job::Job`] directly, it
//! emits these and `peft_storage::state` replays them.

use crate::anomaly::Anomaly;
use crate::artifact::Artifact;
use crate::checkpoint::CheckpointHandle;
use crate::config::Config;
use crate::error::ErrorKind;
use crate::job::{JobId, JobState};
use crate::metrics::MetricsSample;
use crate::notification::Notification;
use crate::quality::QualityAnalysis;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// Carries the full [`Config`] so a replaying [`crate::job::Job`] can be
    /// reconstructed from the WAL alone, without a separate create-request store.
    JobCreated { job_id: JobId, config: Config, created_at_ms: u64 },
    JobTransitioned { job_id: JobId, to: JobState, at_ms: u64 },
    MetricsIngested { job_id: JobId, sample: MetricsSample },
    AnomalyDetected { job_id: JobId, anomaly: Anomaly },
    NotificationSent { job_id: JobId, notification: Notification },
    CheckpointWritten { job_id: JobId, handle: CheckpointHandle },
    ArtifactRecorded { job_id: JobId, artifact: Artifact },
    QualityAnalysisRecorded { job_id: JobId, analysis: QualityAnalysis },
    /// `kind` lets subscribers (e.g. the notification engine's §4.C
    /// auto-critical escalation) classify the failure without re-parsing
    /// `message`.
    ErrorRecorded { job_id: JobId, message: String, kind: ErrorKind },
}

impl Event {
    /// Event name for log spans, e.g. "job_transitioned".
    pub fn name(&self) -> &'static str {
        match self {
            Event::JobCreated { .. } => "job_created",
            Event::JobTransitioned { .. } => "job_transitioned",
            Event::MetricsIngested { .. } => "metrics_ingested",
            Event::AnomalyDetected { .. } => "anomaly_detected",
            Event::NotificationSent { .. } => "notification_sent",
            Event::CheckpointWritten { .. } => "checkpoint_written",
            Event::ArtifactRecorded { .. } => "artifact_recorded",
            Event::QualityAnalysisRecorded { .. } => "quality_analysis_recorded",
            Event::ErrorRecorded { .. } => "error_recorded",
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            Event::JobCreated { job_id, .. }
            | Event::JobTransitioned { job_id, .. }
            | Event::MetricsIngested { job_id, .. }
            | Event::AnomalyDetected { job_id, .. }
            | Event::NotificationSent { job_id, .. }
            | Event::CheckpointWritten { job_id, .. }
            | Event::ArtifactRecorded { job_id, .. }
            | Event::QualityAnalysisRecorded { job_id, .. }
            | Event::ErrorRecorded { job_id, .. } => job_id,
        }
    }

    /// One-line summary for structured logging, never the full payload
    /// (metrics samples and checkpoints are too large to log wholesale).
    pub fn log_summary(&self) -> String {
        match self {
            Event::JobCreated { job_id, .. } => format!("job_id={job_id}"),
            Event::JobTransitioned { job_id, to, .. } => format!("job_id={job_id} to={to}"),
            Event::MetricsIngested { job_id, sample } => {
                format!("job_id={job_id} step={}", sample.step)
            }
            Event::AnomalyDetected { job_id, anomaly } => {
                format!("job_id={job_id} kind={}", anomaly.kind)
            }
            Event::NotificationSent { job_id, notification } => {
                format!("job_id={job_id} kind={}", notification.kind)
            }
            Event::CheckpointWritten { job_id, handle } => {
                format!("job_id={job_id} step={}", handle.step)
            }
            Event::ArtifactRecorded { job_id, artifact } => {
                format!("job_id={job_id} artifact_id={}", artifact.artifact_id)
            }
            Event::QualityAnalysisRecorded { job_id, analysis } => {
                format!("job_id={job_id} quality_score={}", analysis.quality_score)
            }
            Event::ErrorRecorded { job_id, kind, .. } => format!("job_id={job_id} kind={kind}"),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
