// SPDX-License-Identifier: MIT

//! Metrics sample, bounded history ring, loss-zone and ETA derivation (§3, §4.E).

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Minimum number of most-recent samples retained in memory per job (§3).
pub const MIN_HISTORY_CAPACITY: usize = 100;

/// Per-step training metrics (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSample {
    pub step: u64,
    pub epoch: f64,
    pub loss: f64,
    pub learning_rate: f64,
    pub grad_norm: Option<f64>,
    pub throughput: f64,
    pub samples_per_second: f64,
    #[serde(default)]
    pub gpu_util: Vec<f64>,
    #[serde(default)]
    pub gpu_mem_used: Vec<f64>,
    #[serde(default)]
    pub gpu_mem_total: Vec<f64>,
    #[serde(default)]
    pub gpu_temp: Vec<f64>,
    pub cpu_util: f64,
    pub ram_used: f64,
    pub val_loss: Option<f64>,
    pub val_perplexity: Option<f64>,
    pub timestamp_ms: u64,
    pub elapsed: Duration,
    pub eta: Duration,
}

/// Visualization zone derived from the current and previous loss (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossZone {
    Green,
    Yellow,
    Red,
}

/// Compute the loss zone for visualization, in the priority order specified
/// by §4.E: invalid -> red; with history, +10% change or |loss| > 2.0 -> red,
/// decreasing and < 1.0 -> green, decreasing and >= 1.0 -> yellow, otherwise
/// yellow; without history, thresholds on absolute loss alone.
pub fn loss_zone(current_loss: f64, previous_loss: Option<f64>) -> LossZone {
    if !current_loss.is_finite() || current_loss < 0.0 {
        return LossZone::Red;
    }

    match previous_loss {
        Some(previous) if previous.is_finite() && previous != 0.0 => {
            let pct_change = (current_loss - previous) / previous;
            if pct_change > 0.10 {
                return LossZone::Red;
            }
            if current_loss.abs() > 2.0 {
                return LossZone::Red;
            }
            let decreasing = current_loss < previous;
            if decreasing && current_loss < 1.0 {
                LossZone::Green
            } else {
                // Covers "decreasing and >= 1.0" and the "otherwise yellow" fallback.
                LossZone::Yellow
            }
        }
        _ => {
            if current_loss < 1.0 {
                LossZone::Green
            } else if current_loss < 2.0 {
                LossZone::Yellow
            } else {
                LossZone::Red
            }
        }
    }
}

/// ETA from the average `samples_per_second` of the last 10 samples (§4.E).
///
/// The distilled original computes a throughput benchmark that is never fed
/// into the ETA calculation (§9 open question); here it is wired: each
/// ingested sample's `samples_per_second` feeds this rolling average
/// directly instead of being dropped or silently simulated.
pub fn estimate_eta(recent_throughputs: &[f64], remaining_steps: u64) -> Duration {
    if recent_throughputs.is_empty() {
        return Duration::ZERO;
    }
    let sum: f64 = recent_throughputs.iter().sum();
    let avg = sum / recent_throughputs.len() as f64;
    if avg <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(remaining_steps as f64 / avg)
}

/// Bounded append-only ring of metric samples for one job (§3: "bounded ring
/// of >= last 100 samples kept in memory").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsHistory {
    capacity: usize,
    samples: VecDeque<MetricsSample>,
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::with_capacity(MIN_HISTORY_CAPACITY)
    }
}

impl MetricsHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity: capacity.max(MIN_HISTORY_CAPACITY), samples: VecDeque::new() }
    }

    /// Append a sample, evicting the oldest once over capacity.
    ///
    /// Returns `false` (and does not insert) if `sample.step` is not
    /// strictly greater than the previous sample's step, enforcing §8
    /// invariant 2 (strictly increasing step order) at the source.
    pub fn push(&mut self, sample: MetricsSample) -> bool {
        if let Some(last) = self.samples.back() {
            if sample.step <= last.step {
                return false;
            }
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        true
    }

    pub fn last(&self) -> Option<&MetricsSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Most recent `n` samples' `samples_per_second`, oldest first.
    pub fn recent_throughputs(&self, n: usize) -> Vec<f64> {
        self.samples.iter().rev().take(n).map(|s| s.samples_per_second).rev().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricsSample> {
        self.samples.iter()
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
