// SPDX-License-Identifier: MIT

//! Stateful per-job anomaly detection (§4.B), grounded 1:1 on
//! `original_source/backend/services/anomaly_detection_service.py`'s four
//! `detect_*` methods and thresholds.

use parking_lot::RwLock;
use peft_core::{Anomaly, AnomalyKind, DetectedAt, JobId, MetricsSample, Severity, SuggestedAction};
use std::collections::{HashMap, VecDeque};

/// Configurable thresholds, defaults taken verbatim from §4.B.
#[derive(Debug, Clone, Copy)]
pub struct AnomalyThresholds {
    pub loss_divergence_threshold: f64,
    pub gradient_explosion_threshold: f64,
    pub gradient_spike_multiplier: f64,
    pub overfitting_gap_threshold: f64,
    pub memory_threshold: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            loss_divergence_threshold: 2.0,
            gradient_explosion_threshold: 10.0,
            gradient_spike_multiplier: 5.0,
            overfitting_gap_threshold: 0.5,
            memory_threshold: 0.90,
        }
    }
}

const WINDOW: usize = 10;

#[derive(Default)]
struct JobBuffers {
    loss: VecDeque<f64>,
    grad_norm: VecDeque<f64>,
    mem_util: VecDeque<f64>,
    train_val: VecDeque<(f64, f64)>,
}

/// Per-job rolling-buffer detector. Pure over its input stream: feeding
/// the same sequence of samples for a job produces the same sequence of
/// anomalies (§4.B).
pub struct AnomalyDetector {
    thresholds: AnomalyThresholds,
    buffers: RwLock<HashMap<String, JobBuffers>>,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(AnomalyThresholds::default())
    }
}

impl AnomalyDetector {
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds, buffers: RwLock::new(HashMap::new()) }
    }

    /// Drop all buffers for `job_id` (§4.B `clear`).
    pub fn clear(&self, job_id: &JobId) {
        self.buffers.write().remove(job_id.as_str());
    }

    /// Run every detector against `sample`, updating this job's buffers
    /// first, and return every anomaly the sample triggered (zero or
    /// more, §4.B).
    pub fn check_all(&self, job_id: &JobId, sample: &MetricsSample) -> Vec<Anomaly> {
        let mut buffers = self.buffers.write();
        let entry = buffers.entry(job_id.as_str().to_string()).or_default();

        let detected_at = DetectedAt { step: sample.step, timestamp_ms: sample.timestamp_ms };
        let mut anomalies = Vec::new();

        if let Some(a) = detect_loss_divergence(&mut entry.loss, sample.loss, detected_at, self.thresholds.loss_divergence_threshold) {
            anomalies.push(a);
        }
        if let Some(grad_norm) = sample.grad_norm {
            if let Some(a) = detect_gradient_explosion(&mut entry.grad_norm, grad_norm, detected_at, &self.thresholds) {
                anomalies.push(a);
            }
        }
        if let Some(val_loss) = sample.val_loss {
            entry.train_val.push_back((sample.loss, val_loss));
            if entry.train_val.len() > WINDOW {
                entry.train_val.pop_front();
            }
            if let Some(a) = detect_overfitting(&entry.train_val, detected_at, self.thresholds.overfitting_gap_threshold) {
                anomalies.push(a);
            }
        }
        if let Some(a) = detect_oom(&sample.gpu_mem_used, &sample.gpu_mem_total, detected_at, self.thresholds.memory_threshold) {
            anomalies.push(a);
        }
        if !sample.gpu_mem_used.is_empty() && !sample.gpu_mem_total.is_empty() {
            let util = average_ratio(&sample.gpu_mem_used, &sample.gpu_mem_total);
            entry.mem_util.push_back(util);
            if entry.mem_util.len() > WINDOW {
                entry.mem_util.pop_front();
            }
            if let Some(a) = detect_memory_leak(&entry.mem_util, detected_at) {
                anomalies.push(a);
            }
        }

        anomalies
    }
}

fn average_ratio(used: &[f64], total: &[f64]) -> f64 {
    let pairs: Vec<f64> = used.iter().zip(total.iter()).filter(|(_, t)| **t > 0.0).map(|(u, t)| u / t).collect();
    if pairs.is_empty() {
        0.0
    } else {
        pairs.iter().sum::<f64>() / pairs.len() as f64
    }
}

fn detect_loss_divergence(history: &mut VecDeque<f64>, loss: f64, at: DetectedAt, threshold: f64) -> Option<Anomaly> {
    if !loss.is_finite() {
        history.push_back(loss);
        if history.len() > WINDOW {
            history.pop_front();
        }
        return Some(Anomaly::new(
            AnomalyKind::LossDivergence,
            Severity::Critical,
            format!("loss became non-finite ({loss}) at step {}", at.step),
            at,
            recovery_actions(),
        ));
    }

    let divergence = if history.len() >= 4 {
        let min_prev: f64 = history.iter().rev().take(4).cloned().fold(f64::INFINITY, f64::min);
        min_prev.is_finite() && loss > min_prev * threshold
    } else {
        false
    };

    history.push_back(loss);
    if history.len() > WINDOW {
        history.pop_front();
    }

    if divergence {
        Some(Anomaly::new(
            AnomalyKind::LossDivergence,
            Severity::High,
            format!("loss {loss:.4} exceeds {threshold}x the recent minimum at step {}", at.step),
            at,
            recovery_actions(),
        ))
    } else {
        None
    }
}

fn recovery_actions() -> Vec<SuggestedAction> {
    vec![
        SuggestedAction::new("reduce_learning_rate", true),
        SuggestedAction::new("reload_last_checkpoint", true),
        SuggestedAction::new("enable_gradient_clipping", true),
    ]
}

fn detect_gradient_explosion(history: &mut VecDeque<f64>, grad_norm: f64, at: DetectedAt, thresholds: &AnomalyThresholds) -> Option<Anomaly> {
    let result = if grad_norm > thresholds.gradient_explosion_threshold {
        Some(Anomaly::new(
            AnomalyKind::GradientExplosion,
            Severity::High,
            format!("gradient norm {grad_norm:.2} exceeds {}", thresholds.gradient_explosion_threshold),
            at,
            vec![SuggestedAction::new("reduce_learning_rate", true), SuggestedAction::new("enable_gradient_clipping", true)],
        ))
    } else if history.len() >= 4 {
        let avg_prev: f64 = history.iter().rev().take(4).sum::<f64>() / 4.0;
        if avg_prev > 0.0 && grad_norm >= avg_prev * thresholds.gradient_spike_multiplier {
            Some(Anomaly::new(
                AnomalyKind::GradientExplosion,
                Severity::Medium,
                format!("gradient norm {grad_norm:.2} spiked to {}x the recent average", thresholds.gradient_spike_multiplier),
                at,
                vec![SuggestedAction::new("reduce_learning_rate", true), SuggestedAction::new("enable_gradient_clipping", true)],
            ))
        } else {
            None
        }
    } else {
        None
    };

    history.push_back(grad_norm);
    if history.len() > WINDOW {
        history.pop_front();
    }
    result
}

fn detect_overfitting(pairs: &VecDeque<(f64, f64)>, at: DetectedAt, gap_threshold: f64) -> Option<Anomaly> {
    if pairs.len() < 3 {
        return None;
    }
    let (train, val) = pairs.back().copied().unwrap();
    if val - train <= gap_threshold {
        return None;
    }

    // `recent` is newest-first; oldest-to-newest train loss must be
    // non-increasing and validation loss non-decreasing.
    let recent: Vec<(f64, f64)> = pairs.iter().rev().take(3).copied().collect();
    let train_decreasing = recent[0].0 <= recent[1].0 && recent[1].0 <= recent[2].0;
    let val_increasing = recent[0].1 >= recent[1].1 && recent[1].1 >= recent[2].1;

    if !(train_decreasing && val_increasing) {
        return None;
    }

    Some(Anomaly::new(
        AnomalyKind::Overfitting,
        Severity::Medium,
        format!("validation loss {val:.4} exceeds train loss {train:.4} by more than {gap_threshold}"),
        at,
        vec![
            SuggestedAction::new("increase dropout or weight decay", false),
            SuggestedAction::new("reduce the number of epochs", false),
            SuggestedAction::new("expand the training dataset", false),
        ],
    ))
}

fn detect_oom(used: &[f64], total: &[f64], at: DetectedAt, threshold: f64) -> Option<Anomaly> {
    let worst = used
        .iter()
        .zip(total.iter())
        .filter(|(_, t)| **t > 0.0)
        .map(|(u, t)| u / t)
        .fold(0.0_f64, f64::max);
    if worst > threshold {
        Some(Anomaly::new(
            AnomalyKind::Oom,
            Severity::High,
            format!("GPU memory utilization {:.0}% exceeds {:.0}%", worst * 100.0, threshold * 100.0),
            at,
            vec![
                SuggestedAction::new("reduce_batch_size", true),
                SuggestedAction::new("enable gradient checkpointing", false),
            ],
        ))
    } else {
        None
    }
}

fn detect_memory_leak(history: &VecDeque<f64>, at: DetectedAt) -> Option<Anomaly> {
    if history.len() < WINDOW {
        return None;
    }
    let increases = history.iter().zip(history.iter().skip(1)).filter(|(prev, next)| next > prev).count();
    if increases >= 7 {
        Some(Anomaly::new(
            AnomalyKind::MemoryLeak,
            Severity::Medium,
            format!("GPU memory utilization increased in {increases}/9 recent steps"),
            at,
            vec![
                SuggestedAction::new("reduce_batch_size", true),
                SuggestedAction::new("restart the training process to release leaked memory", false),
            ],
        ))
    } else {
        None
    }
}

#[cfg(test)]
#[path = "anomaly_tests.rs"]
mod tests;
