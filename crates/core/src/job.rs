// SPDX-License-Identifier: MIT

//! Job identifier and lifecycle state (§3, §4.F).

use crate::artifact::Artifact;
use crate::checkpoint::CheckpointHandle;
use crate::config::Config;
use crate::metrics::{MetricsHistory, MetricsSample};
use crate::notification::Notification;
use crate::quality::QualityAnalysis;
use serde::{Deserialize, Serialize};

/// Client-chosen unique job identifier (§3: "Identified by a client-chosen
/// unique `job_id`"). Unlike [`crate::id::IdBuf`]-backed ids, this is never
/// generated by the core — the caller picks it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Job lifecycle state (§4.F).
///
/// `CREATED → INITIALIZING → RUNNING ⇄ PAUSED → {COMPLETED | FAILED | STOPPED}`.
/// Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Initializing,
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
}

crate::simple_display! {
    JobState {
        Created => "created",
        Initializing => "initializing",
        Running => "running",
        Paused => "paused",
        Completed => "completed",
        Failed => "failed",
        Stopped => "stopped",
    }
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Stopped)
    }

    pub fn is_active(self) -> bool {
        matches!(self, JobState::Running | JobState::Paused)
    }

    /// Whether `self -> next` is a legal edge of the §4.F transition table.
    /// `stop()` is reachable from any non-terminal state (idempotent on
    /// terminal states, handled separately by the caller).
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (Created, Initializing) => true,
            (Initializing, Running) => true,
            (Running, Paused) => true,
            (Paused, Initializing) => true,
            (Running, Completed) | (Running, Failed) => true,
            (_, Stopped) => true,
            _ => false,
        }
    }
}

/// Reason the [`Job::error`] / terminal notification was raised, used to
/// drive §4.C's error-vs-warning-vs-completion notification split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    Completed,
    Failed(String),
    Stopped,
}

/// The central job entity (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub config: Config,
    pub state: JobState,

    pub current_metrics: Option<MetricsSample>,
    #[serde(default)]
    pub metrics_history: MetricsHistory,

    pub error_message: Option<String>,

    pub created_at_ms: u64,
    pub started_at_ms: Option<u64>,
    pub paused_at_ms: Option<u64>,
    pub completed_at_ms: Option<u64>,

    pub checkpoint_handle: Option<CheckpointHandle>,

    pub provider: Option<String>,
    pub provider_job_id: Option<String>,

    pub artifact_info: Option<Artifact>,
    pub quality_analysis: Option<QualityAnalysis>,

    #[serde(default)]
    pub notifications: Vec<Notification>,

    /// True while a cooperative pause request is outstanding (§4.F pause
    /// semantics). Cleared on ack or timeout.
    #[serde(default)]
    pub pause_requested: bool,
}

impl Job {
    pub fn new(id: JobId, config: Config, created_at_ms: u64) -> Self {
        Self {
            id,
            config,
            state: JobState::Created,
            current_metrics: None,
            metrics_history: MetricsHistory::default(),
            error_message: None,
            created_at_ms,
            started_at_ms: None,
            paused_at_ms: None,
            completed_at_ms: None,
            checkpoint_handle: None,
            provider: None,
            provider_job_id: None,
            artifact_info: None,
            quality_analysis: None,
            notifications: Vec::new(),
            pause_requested: false,
        }
    }

    /// Apply a validated state transition, recording timestamps as §3's
    /// invariants require (`started_at` set once, never rewound; `created
    /// <= started <= (paused <= resumed)* <= completed`).
    pub fn transition(&mut self, next: JobState, now_ms: u64) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        match next {
            JobState::Running if self.started_at_ms.is_none() => {
                self.started_at_ms = Some(now_ms);
            }
            JobState::Paused => {
                self.paused_at_ms = Some(now_ms);
            }
            JobState::Completed | JobState::Failed | JobState::Stopped => {
                self.completed_at_ms = Some(now_ms);
            }
            _ => {}
        }
        self.state = next;
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn latest_loss(&self) -> Option<f64> {
        self.current_metrics.as_ref().map(|m| m.loss)
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            id: JobId = "job-test-1",
        }
        set {
            config: Config = crate::config::Config::builder().build(),
            state: JobState = JobState::Created,
            metrics_history: MetricsHistory = MetricsHistory::default(),
            created_at_ms: u64 = 1_000_000,
            notifications: Vec<Notification> = Vec::new(),
            pause_requested: bool = false,
        }
        option {
            current_metrics: MetricsSample = None,
            error_message: String = None,
            started_at_ms: u64 = None,
            paused_at_ms: u64 = None,
            completed_at_ms: u64 = None,
            checkpoint_handle: CheckpointHandle = None,
            provider: String = None,
            provider_job_id: String = None,
            artifact_info: Artifact = None,
            quality_analysis: QualityAnalysis = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
