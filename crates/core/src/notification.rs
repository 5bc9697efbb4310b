// SPDX-License-Identifier: MIT

//! Notification value object (§3, §4.C). The stateful milestone/DND logic
//! that produces these lives in `peft_engine::notification::NotificationEngine`;
//! this module only defines the shape carried on a [`crate::job::Job`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Progress,
    Error,
    Completion,
    Warning,
}

crate::simple_display! {
    NotificationKind {
        Progress => "progress",
        Error => "error",
        Completion => "completion",
        Warning => "warning",
    }
}

/// Desktop notification urgency, mirroring `notify-rust`'s hint levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Normal,
    Critical,
}

/// A non-automatic follow-up the user (or caller) may invoke in response
/// to a notification, e.g. "Resume" on a paused-by-anomaly job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub milestone: Option<u8>,
    pub urgency: Urgency,
    pub sound: bool,
    pub taskbar_progress: Option<f64>,
    pub respect_dnd: bool,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
}

crate::builder! {
    pub struct NotificationBuilder => Notification {
        into {
            title: String = "Training update",
            body: String = "50% complete",
        }
        set {
            kind: NotificationKind = NotificationKind::Progress,
            urgency: Urgency = Urgency::Normal,
            sound: bool = false,
            respect_dnd: bool = true,
            actions: Vec<NotificationAction> = Vec::new(),
        }
        option {
            milestone: u8 = Some(50),
            taskbar_progress: f64 = Some(0.5),
        }
    }
}

#[cfg(test)]
#[path = "notification_tests.rs"]
mod tests;
