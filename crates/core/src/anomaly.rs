// SPDX-License-Identifier: MIT

//! Anomaly value object (§3, §4.B). Detection logic lives in
//! `peft_engine::anomaly::AnomalyDetector`, grounded on
//! `original_source/backend/services/anomaly_detection_service.py`.

use crate::error::SuggestedAction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    LossDivergence,
    GradientExplosion,
    Overfitting,
    Oom,
    MemoryLeak,
}

crate::simple_display! {
    AnomalyKind {
        LossDivergence => "loss_divergence",
        GradientExplosion => "gradient_explosion",
        Overfitting => "overfitting",
        Oom => "oom",
        MemoryLeak => "memory_leak",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// `(step, timestamp)` at which an anomaly was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedAt {
    pub step: u64,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub message: String,
    pub detected_at: DetectedAt,
    pub suggested_actions: Vec<SuggestedAction>,
    pub auto_recoverable: bool,
}

impl Anomaly {
    /// `auto_recoverable` is derived, never set independently: true iff any
    /// suggested action is itself automatic (§4.B).
    pub fn new(
        kind: AnomalyKind,
        severity: Severity,
        message: impl Into<String>,
        detected_at: DetectedAt,
        suggested_actions: Vec<SuggestedAction>,
    ) -> Self {
        let auto_recoverable = suggested_actions.iter().any(|action| action.automatic);
        Self { kind, severity, message: message.into(), detected_at, suggested_actions, auto_recoverable }
    }
}

crate::builder! {
    pub struct AnomalyBuilder => Anomaly {
        into {
            message: String = "loss diverged",
        }
        set {
            kind: AnomalyKind = AnomalyKind::LossDivergence,
            severity: Severity = Severity::High,
            detected_at: DetectedAt = DetectedAt { step: 100, timestamp_ms: 1_000_000 },
            suggested_actions: Vec<SuggestedAction> = Vec::new(),
            auto_recoverable: bool = false,
        }
    }
}

#[cfg(test)]
#[path = "anomaly_tests.rs"]
mod tests;
