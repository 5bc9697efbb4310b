// SPDX-License-Identifier: MIT

//! Milestone-crossing and DND-aware notification dispatch (§4.C).
//! Grounded on `original_source/backend/services/notification_service.py`,
//! delivery itself on `peft_connectors::notify`.

use parking_lot::RwLock;
use peft_connectors::{DndProvider, NotifyAdapter};
use peft_core::{CoreResult, Job, JobId, Notification, NotificationKind, Urgency};
use std::collections::HashMap;
use std::sync::Arc;

const MILESTONES: [u8; 4] = [25, 50, 75, 100];

/// Tracks which percentage milestones each job has already crossed so a
/// re-delivered sample at the same progress never re-notifies (§4.C
/// idempotence).
pub struct NotificationEngine<N, D> {
    adapter: Arc<N>,
    dnd: Arc<D>,
    crossed: RwLock<HashMap<String, Vec<u8>>>,
}

impl<N, D> NotificationEngine<N, D>
where
    N: NotifyAdapter,
    D: DndProvider,
{
    pub fn new(adapter: Arc<N>, dnd: Arc<D>) -> Self {
        Self { adapter, dnd, crossed: RwLock::new(HashMap::new()) }
    }

    pub fn clear(&self, job_id: &JobId) {
        self.crossed.write().remove(job_id.as_str());
    }

    /// Given a job's current progress, deliver a notification for every
    /// milestone newly crossed since the last call (§4.C: 25/50/75/100%,
    /// each fired at most once per job).
    pub async fn check_progress(&self, job: &Job) -> CoreResult<Vec<Notification>> {
        let Some(percent) = progress_percent(job) else {
            return Ok(Vec::new());
        };

        let newly_crossed: Vec<u8> = {
            let mut crossed = self.crossed.write();
            let seen = crossed.entry(job.id.as_str().to_string()).or_default();
            let fresh: Vec<u8> = MILESTONES.iter().copied().filter(|m| percent >= *m as f64 && !seen.contains(m)).collect();
            seen.extend(fresh.iter().copied());
            fresh
        };

        let mut sent = Vec::new();
        for milestone in newly_crossed {
            let kind = if milestone == 100 { NotificationKind::Completion } else { NotificationKind::Progress };
            let notification = Notification {
                kind,
                title: format!("{} training", job.config.base_model),
                body: format!("{milestone}% complete"),
                milestone: Some(milestone),
                urgency: Urgency::Normal,
                sound: milestone == 100,
                taskbar_progress: Some(clamp_unit(percent / 100.0)),
                respect_dnd: milestone != 100,
                actions: Vec::new(),
            };
            self.deliver(&notification).await?;
            sent.push(notification);
        }
        Ok(sent)
    }

    /// Deliver a single notification not tied to progress milestones
    /// (errors, warnings, anomaly alerts).
    pub async fn notify(&self, notification: Notification) -> CoreResult<()> {
        self.deliver(&notification).await
    }

    async fn deliver(&self, notification: &Notification) -> CoreResult<()> {
        if notification.respect_dnd && notification.urgency != Urgency::Critical && self.dnd.is_dnd_active().await {
            return Ok(());
        }
        self.adapter.notify(notification).await
    }
}

fn progress_percent(job: &Job) -> Option<f64> {
    let sample = job.current_metrics.as_ref()?;
    let total = job.config.max_steps? as f64;
    if total <= 0.0 {
        return None;
    }
    Some(clamp_unit(sample.step as f64 / total) * 100.0)
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
#[path = "notification_tests.rs"]
mod tests;
