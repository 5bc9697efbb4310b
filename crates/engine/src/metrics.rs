// SPDX-License-Identifier: MIT

//! Per-job metrics fan-out (§4.E): a bounded history ring plus broadcast
//! to external subscribers with a coalescing-drop policy so one slow
//! subscriber never backs up ingestion for the rest.

use parking_lot::RwLock;
use peft_core::{estimate_eta, loss_zone, JobId, LossZone, MetricsHistory, MetricsSample};
use std::collections::HashMap;
use tokio::sync::watch;

const RECENT_THROUGHPUT_WINDOW: usize = 10;

/// One ingested sample enriched with derived visualization fields.
#[derive(Debug, Clone)]
pub struct MetricsUpdate {
    pub job_id: JobId,
    pub sample: MetricsSample,
    pub loss_zone: LossZone,
}

/// A subscriber's view of a job's metrics stream. Backed by a `watch`
/// channel rather than a bounded mailbox: a `watch` holds only the most
/// recently sent value, so a subscriber that hasn't polled since the last
/// send observes exactly the newest sample on its next poll, never a
/// backlog of stale ones (§4.E coalescing-drop policy, §8 boundary
/// behavior).
pub struct MetricsSubscription {
    rx: watch::Receiver<Option<MetricsUpdate>>,
}

impl MetricsSubscription {
    /// Await the next sample, coalescing away any samples sent while this
    /// subscriber wasn't polling. Returns `None` once the job's metrics
    /// state is cleared (every sender dropped), signalling the stream end.
    pub async fn recv(&mut self) -> Option<MetricsUpdate> {
        loop {
            if self.rx.changed().await.is_err() {
                return None;
            }
            if let Some(update) = self.rx.borrow_and_update().clone() {
                return Some(update);
            }
        }
    }
}

struct JobState {
    history: MetricsHistory,
    subscribers: Vec<watch::Sender<Option<MetricsUpdate>>>,
}

impl Default for JobState {
    fn default() -> Self {
        Self { history: MetricsHistory::default(), subscribers: Vec::new() }
    }
}

/// Owns every job's metrics ring and subscriber set.
#[derive(Default)]
pub struct MetricsPipeline {
    jobs: RwLock<HashMap<String, JobState>>,
}

impl MetricsPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self, job_id: &JobId) {
        self.jobs.write().remove(job_id.as_str());
    }

    /// Subscribe to every future update for `job_id`.
    pub fn subscribe(&self, job_id: &JobId) -> MetricsSubscription {
        let (tx, rx) = watch::channel(None);
        let mut jobs = self.jobs.write();
        jobs.entry(job_id.as_str().to_string()).or_default().subscribers.push(tx);
        MetricsSubscription { rx }
    }

    /// Record `sample` into the job's history and fan it out to every live
    /// subscriber. A `watch` send never blocks and always coalesces to the
    /// newest value for any subscriber still catching up (§4.E). Returns
    /// `false` if the sample was rejected for violating step order (§8
    /// invariant 2).
    pub fn ingest(&self, job_id: &JobId, sample: MetricsSample) -> bool {
        let mut jobs = self.jobs.write();
        let state = jobs.entry(job_id.as_str().to_string()).or_default();

        let previous_loss = state.history.last().map(|s| s.loss);
        let current_loss = sample.loss;
        if !state.history.push(sample.clone()) {
            return false;
        }

        let update = MetricsUpdate { job_id: job_id.clone(), sample, loss_zone: loss_zone(current_loss, previous_loss) };
        state.subscribers.retain(|tx| tx.send(Some(update.clone())).is_ok());
        true
    }

    /// Estimate remaining time from the last [`RECENT_THROUGHPUT_WINDOW`]
    /// samples' `samples_per_second` (§4.E).
    pub fn eta(&self, job_id: &JobId, remaining_steps: u64) -> std::time::Duration {
        let jobs = self.jobs.read();
        let Some(state) = jobs.get(job_id.as_str()) else {
            return std::time::Duration::ZERO;
        };
        let throughputs = state.history.recent_throughputs(RECENT_THROUGHPUT_WINDOW);
        estimate_eta(&throughputs, remaining_steps)
    }

    pub fn history_len(&self, job_id: &JobId) -> usize {
        self.jobs.read().get(job_id.as_str()).map_or(0, |s| s.history.len())
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
