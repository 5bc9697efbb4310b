// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! peft-engine: the job runtime state machine, the background services
//! it leans on (anomaly detection, metrics, notifications, checkpoints,
//! provider dispatch), the multi-run manager, and the in-process
//! façade a transport layer drives.

pub mod anomaly;
pub mod checkpoint;
pub mod dispatch;
pub mod facade;
pub mod manager;
pub mod metrics;
pub mod notification;
pub mod quality;
pub mod runtime;

pub use anomaly::{AnomalyDetector, AnomalyThresholds};
pub use checkpoint::CheckpointStore;
pub use dispatch::ProviderDispatcher;
pub use facade::Orchestrator;
pub use manager::{RunFilter, RunManager, RunStats};
pub use metrics::{MetricsPipeline, MetricsSubscription, MetricsUpdate};
pub use notification::NotificationEngine;
pub use runtime::{JobCommand, JobRuntime};
