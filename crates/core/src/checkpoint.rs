// SPDX-License-Identifier: MIT

//! Checkpoint snapshot and handle (§3, §4.D).

use crate::config::Config;
use crate::metrics::MetricsSample;
use serde::{Deserialize, Serialize};

/// Why a checkpoint was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointReason {
    Manual,
    Scheduled,
    Pause,
    Anomaly,
}

crate::simple_display! {
    CheckpointReason {
        Manual => "manual",
        Scheduled => "scheduled",
        Pause => "pause",
        Anomaly => "anomaly",
    }
}

/// A full training snapshot sufficient to resume later (§3).
///
/// `model_state` / `optimizer_state` / `scheduler_state` are opaque blobs
/// from the core's point of view — the training driver owns their format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub step: u64,
    pub epoch: f64,
    pub loss: f64,
    pub learning_rate: f64,
    pub model_state: Vec<u8>,
    pub optimizer_state: Vec<u8>,
    pub scheduler_state: Option<Vec<u8>>,
    pub recent_metrics: Vec<MetricsSample>,
    pub config_snapshot: Config,
    pub timestamp_ms: u64,
    pub reason: CheckpointReason,
}

/// Lightweight reference to a persisted [`Checkpoint`], kept on the
/// [`crate::job::Job`] so the full blob needn't be held in memory (§4.D).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointHandle {
    pub step: u64,
    pub path: String,
    pub sha256: String,
    pub reason: CheckpointReason,
    pub timestamp_ms: u64,
}

impl CheckpointHandle {
    pub fn new(checkpoint: &Checkpoint, path: impl Into<String>, sha256: impl Into<String>) -> Self {
        Self {
            step: checkpoint.step,
            path: path.into(),
            sha256: sha256.into(),
            reason: checkpoint.reason,
            timestamp_ms: checkpoint.timestamp_ms,
        }
    }
}

crate::builder! {
    pub struct CheckpointBuilder => Checkpoint {
        set {
            step: u64 = 100,
            epoch: f64 = 1.0,
            loss: f64 = 0.5,
            learning_rate: f64 = 2e-4,
            model_state: Vec<u8> = Vec::new(),
            optimizer_state: Vec<u8> = Vec::new(),
            recent_metrics: Vec<MetricsSample> = Vec::new(),
            config_snapshot: Config = crate::config::Config::builder().build(),
            timestamp_ms: u64 = 1_000_000,
            reason: CheckpointReason = CheckpointReason::Manual,
        }
        option {
            scheduler_state: Vec<u8> = None,
        }
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
