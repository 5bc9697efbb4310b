// SPDX-License-Identifier: MIT

//! Requests a `peftctl` client sends to `peftd` over the IPC socket (§6).
//! Tagged the way the teacher's own `oj-daemon::protocol::Request` is, so
//! new fields can default on the wire without breaking older clients.

use crate::types::HistoryFilter;
use peft_core::Config;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    CreateJob { job_id: String, config: Config },
    Start { job_id: String },
    Pause { job_id: String },
    Resume { job_id: String },
    Stop { job_id: String },
    Status { job_id: String },
    GetArtifact { job_id: String },
    Cleanup { job_id: String },

    /// Open-ended subscription: the daemon keeps streaming
    /// [`crate::Response::MetricsSample`] frames on this connection until
    /// the job terminates or the client disconnects (§6
    /// `subscribe_metrics`).
    SubscribeMetrics { job_id: String },
    /// Same shape, for [`crate::Response::NotificationSent`] frames (§6
    /// `subscribe_notifications`).
    SubscribeNotifications { job_id: String },

    Active,
    History {
        #[serde(default)]
        filter: HistoryFilter,
        #[serde(default = "default_history_limit")]
        limit: usize,
        #[serde(default)]
        offset: usize,
    },
    Stats,

    ConnectorConnect { name: String, credentials: HashMap<String, String> },
    ConnectorDisconnect { name: String },
    ConnectorList,
}

fn default_history_limit() -> usize {
    50
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
