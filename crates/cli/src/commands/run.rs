// SPDX-License-Identifier: MIT

//! `peftctl run ...` (§4.H multi-run manager: active, history, stats).

use crate::client::{reject, DaemonClient};
use crate::output::{print_job_summaries, print_json, OutputFormat};
use anyhow::Result;
use clap::Subcommand;
use peft_core::JobState;
use peft_wire::{HistoryFilter, Request, Response};

#[derive(Subcommand)]
pub enum RunCommand {
    /// List every job with a live in-process runtime.
    Active,
    /// List jobs from the durable history, optionally filtered.
    History {
        /// Repeatable; one of created/initializing/running/paused/completed/failed/stopped.
        #[arg(long, value_parser = parse_job_state)]
        status: Vec<JobState>,
        #[arg(long)]
        provider: Vec<String>,
        #[arg(long)]
        model_contains: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Print aggregate counts across every known job.
    Stats,
}

fn parse_job_state(s: &str) -> Result<JobState, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).map_err(|_| {
        format!("'{s}' is not a job state (expected one of created/initializing/running/paused/completed/failed/stopped)")
    })
}

pub async fn run(client: &DaemonClient, command: RunCommand, format: OutputFormat) -> Result<()> {
    match command {
        RunCommand::Active => {
            let response = client.send(&Request::Active).await?;
            match response {
                Response::JobSummaries { jobs } => print_job_summaries(&jobs, format),
                other => Err(reject(other)),
            }
        }
        RunCommand::History { status, provider, model_contains, limit, offset } => {
            let filter = HistoryFilter { statuses: status, providers: provider, model_contains, ..Default::default() };
            let response = client.send(&Request::History { filter, limit, offset }).await?;
            match response {
                Response::JobSummaries { jobs } => print_job_summaries(&jobs, format),
                other => Err(reject(other)),
            }
        }
        RunCommand::Stats => {
            let response = client.send(&Request::Stats).await?;
            match response {
                Response::Stats { stats } => print_json(&stats),
                other => Err(reject(other)),
            }
        }
    }
}
