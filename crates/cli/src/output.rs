// SPDX-License-Identifier: MIT

//! Text/JSON output helpers shared across subcommands.

use clap::ValueEnum;
use peft_wire::JobSummary;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Render a job summary table the way `oj job list` prints its table:
/// fixed-width columns, one job per line, no header border.
pub fn print_job_summaries(jobs: &[JobSummary], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(jobs),
        OutputFormat::Text => {
            println!("{:<24} {:<12} {:<16} {:>8} {:>10}", "JOB ID", "STATE", "PROVIDER", "STEP", "LOSS");
            for job in jobs {
                println!(
                    "{:<24} {:<12} {:<16} {:>8} {:>10}",
                    job.id.as_str(),
                    job.state.to_string(),
                    job.provider.as_deref().unwrap_or("local"),
                    job.current_step.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
                    job.current_loss.map(|l| format!("{l:.4}")).unwrap_or_else(|| "-".to_string()),
                );
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
