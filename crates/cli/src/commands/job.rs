// SPDX-License-Identifier: MIT

//! `peftctl job ...` (§6: create_job, start, pause, resume, stop, status,
//! get_artifact, cleanup, subscribe_metrics, subscribe_notifications).

use crate::client::{expect_ok, reject, DaemonClient};
use crate::output::print_json;
use anyhow::{Context, Result};
use clap::Subcommand;
use peft_core::Config;
use peft_wire::{Request, Response};

#[derive(Subcommand)]
pub enum JobCommand {
    /// Create a job from a JSON config file (§3 Config).
    Create {
        job_id: String,
        /// Path to a JSON file deserializing into the job's Config.
        #[arg(long)]
        config: std::path::PathBuf,
    },
    /// Submit the job to its configured backend.
    Start { job_id: String },
    /// Request a cooperative pause and wait for the checkpoint ack.
    Pause { job_id: String },
    /// Resume a paused job from its last checkpoint.
    Resume { job_id: String },
    /// Best-effort terminate.
    Stop { job_id: String },
    /// Print the job's merged live/store snapshot.
    Status { job_id: String },
    /// Print the job's produced artifact, if any.
    Artifact { job_id: String },
    /// Drop in-process bookkeeping for a terminal job.
    Cleanup { job_id: String },
    /// Stream metrics samples until the job reaches a terminal state.
    SubscribeMetrics { job_id: String },
    /// Stream notifications until the job reaches a terminal state.
    SubscribeNotifications { job_id: String },
}

pub async fn run(client: &DaemonClient, command: JobCommand) -> Result<()> {
    match command {
        JobCommand::Create { job_id, config } => {
            let contents = std::fs::read_to_string(&config).with_context(|| format!("reading {}", config.display()))?;
            let config: Config = serde_json::from_str(&contents).context("parsing job config")?;
            let response = client.send(&Request::CreateJob { job_id, config }).await?;
            match response {
                Response::Job { job } => print_json(&job),
                other => Err(reject(other)),
            }
        }
        JobCommand::Start { job_id } => expect_ok(client.send(&Request::Start { job_id }).await?),
        JobCommand::Pause { job_id } => {
            let response = client.send(&Request::Pause { job_id }).await?;
            match response {
                Response::Checkpoint { checkpoint } => print_json(&checkpoint),
                other => Err(reject(other)),
            }
        }
        JobCommand::Resume { job_id } => expect_ok(client.send(&Request::Resume { job_id }).await?),
        JobCommand::Stop { job_id } => expect_ok(client.send(&Request::Stop { job_id }).await?),
        JobCommand::Status { job_id } => {
            let response = client.send(&Request::Status { job_id }).await?;
            match response {
                Response::Job { job } => print_json(&job),
                other => Err(reject(other)),
            }
        }
        JobCommand::Artifact { job_id } => {
            let response = client.send(&Request::GetArtifact { job_id }).await?;
            match response {
                Response::Artifact { artifact } => print_json(&artifact),
                other => Err(reject(other)),
            }
        }
        JobCommand::Cleanup { job_id } => expect_ok(client.send(&Request::Cleanup { job_id }).await?),
        JobCommand::SubscribeMetrics { job_id } => {
            client
                .subscribe(&Request::SubscribeMetrics { job_id }, |response| match response {
                    Response::MetricsSample { sample, .. } => print_json(&sample),
                    Response::StreamEnded { .. } => Ok(()),
                    other => Err(reject(other)),
                })
                .await
        }
        JobCommand::SubscribeNotifications { job_id } => {
            client
                .subscribe(&Request::SubscribeNotifications { job_id }, |response| match response {
                    Response::NotificationSent { notification, .. } => print_json(&notification),
                    Response::StreamEnded { .. } => Ok(()),
                    other => Err(reject(other)),
                })
                .await
        }
    }
}
