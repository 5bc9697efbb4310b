// SPDX-License-Identifier: MIT

//! Production [`TrainingDriver`]: the PEFT math itself is an external
//! collaborator (§1 Non-goals, §9 open question 3), so this module never
//! simulates a loss curve. Instead it shells out to an external training
//! process and speaks a small JSON-lines protocol over its stdin/stdout —
//! grounded on the teacher's own subprocess-spawning idiom
//! (`oj-daemon::adapters::agent::coop::spawn`: `tokio::process::Command`
//! with piped stdio, a reaper task, line-oriented parsing).
//!
//! Wire protocol (one JSON object per line):
//!
//! child -> driver: `{"type":"sample", ...MetricsSample fields...}`,
//!   `{"type":"checkpoint_saved", "step":.., "model_state_path":..,
//!   "optimizer_state_path":.., "scheduler_state_path":?.., ...}`,
//!   `{"type":"pause_acked", ...same shape...}`, `{"type":"completed"}`,
//!   `{"type":"failed", "message":".."}`.
//! driver -> child (stdin): `{"type":"pause"}`, `{"type":"stop"}`.
//!
//! State blobs ride as file paths rather than inline base64 — the driver
//! owns their format and size, and this plumbing never inspects them
//! beyond reading the bytes off disk.

use crate::local::{TrainingCommand, TrainingDriver, TrainingUpdate};
use async_trait::async_trait;
use peft_core::{Checkpoint, CheckpointReason, Config, MetricsSample};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Launches `training_command` (falling back to this driver's configured
/// default) as a child process per job, feeding it the job config on
/// stdin's first line and relaying the cooperative pause/stop protocol
/// over the rest of the pipe.
pub struct ProcessTrainingDriver {
    default_command: Vec<String>,
}

impl ProcessTrainingDriver {
    pub fn new(default_command: Vec<String>) -> Self {
        Self { default_command }
    }

    fn command_for(&self, config: &Config) -> Vec<String> {
        match config.vars.get("training_command") {
            Some(cmd) => cmd.split_whitespace().map(str::to_string).collect(),
            None => self.default_command.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChildEvent {
    Sample(Box<MetricsSample>),
    CheckpointSaved(Box<CheckpointEventPayload>),
    PauseAcked(Box<CheckpointEventPayload>),
    Completed,
    Failed { message: String },
}

#[derive(Debug, Deserialize)]
struct CheckpointEventPayload {
    step: u64,
    epoch: f64,
    loss: f64,
    learning_rate: f64,
    model_state_path: PathBuf,
    optimizer_state_path: PathBuf,
    scheduler_state_path: Option<PathBuf>,
    #[serde(default)]
    recent_metrics: Vec<MetricsSample>,
    timestamp_ms: u64,
}

fn load_checkpoint(payload: CheckpointEventPayload, config: &Config, reason: CheckpointReason) -> std::io::Result<Checkpoint> {
    let model_state = std::fs::read(&payload.model_state_path)?;
    let _ = std::fs::remove_file(&payload.model_state_path);
    let optimizer_state = std::fs::read(&payload.optimizer_state_path)?;
    let _ = std::fs::remove_file(&payload.optimizer_state_path);
    let scheduler_state = match &payload.scheduler_state_path {
        Some(path) => {
            let bytes = std::fs::read(path)?;
            let _ = std::fs::remove_file(path);
            Some(bytes)
        }
        None => None,
    };
    Ok(Checkpoint {
        step: payload.step,
        epoch: payload.epoch,
        loss: payload.loss,
        learning_rate: payload.learning_rate,
        model_state,
        optimizer_state,
        scheduler_state,
        recent_metrics: payload.recent_metrics,
        config_snapshot: config.clone(),
        timestamp_ms: payload.timestamp_ms,
        reason,
    })
}

#[async_trait]
impl TrainingDriver for ProcessTrainingDriver {
    async fn run(
        &self,
        config: Config,
        resume_from: Option<Checkpoint>,
        mut commands: mpsc::Receiver<TrainingCommand>,
        updates: mpsc::Sender<TrainingUpdate>,
    ) {
        let argv = self.command_for(&config);
        let Some((program, args)) = argv.split_first() else {
            let _ = updates.send(TrainingUpdate::Failed("no training_command configured".to_string())).await;
            return;
        };

        let mut child = match Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let _ = updates.send(TrainingUpdate::Failed(format!("failed to spawn training process: {e}"))).await;
                return;
            }
        };

        let Some(mut stdin) = child.stdin.take() else {
            let _ = updates.send(TrainingUpdate::Failed("training process has no stdin".to_string())).await;
            return;
        };
        let Some(stdout) = child.stdout.take() else {
            let _ = updates.send(TrainingUpdate::Failed("training process has no stdout".to_string())).await;
            return;
        };

        let resume_line = serde_json::json!({
            "type": "start",
            "config": config,
            "resume_from": resume_from.map(|c| serde_json::json!({
                "step": c.step,
                "epoch": c.epoch,
            })),
        });
        if let Ok(line) = serde_json::to_string(&resume_line) {
            if stdin.write_all(format!("{line}\n").as_bytes()).await.is_err() {
                let _ = updates.send(TrainingUpdate::Failed("training process closed stdin immediately".to_string())).await;
                return;
            }
        }

        let stderr_reaper = child.stderr.take();
        if let Some(stderr) = stderr_reaper {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "training_process", "{line}");
                }
            });
        }

        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(TrainingCommand::Pause) => {
                            let _ = stdin.write_all(b"{\"type\":\"pause\"}\n").await;
                        }
                        Some(TrainingCommand::Stop) | None => {
                            let _ = stdin.write_all(b"{\"type\":\"stop\"}\n").await;
                            let _ = child.kill().await;
                            return;
                        }
                    }
                }
                line = lines.next_line() => {
                    let Ok(Some(line)) = line else {
                        let _ = updates.send(TrainingUpdate::Failed("training process closed stdout before reporting a terminal event".to_string())).await;
                        return;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let event: ChildEvent = match serde_json::from_str(&line) {
                        Ok(event) => event,
                        Err(e) => {
                            tracing::warn!(error = %e, line = %line, "malformed training process event, ignoring");
                            continue;
                        }
                    };
                    match event {
                        ChildEvent::Sample(sample) => {
                            if updates.send(TrainingUpdate::Sample(*sample)).await.is_err() {
                                return;
                            }
                        }
                        ChildEvent::CheckpointSaved(payload) => {
                            match load_checkpoint(*payload, &config, CheckpointReason::Scheduled) {
                                Ok(checkpoint) => {
                                    if updates.send(TrainingUpdate::CheckpointSaved(Box::new(checkpoint))).await.is_err() {
                                        return;
                                    }
                                }
                                Err(e) => {
                                    let _ = updates.send(TrainingUpdate::Failed(format!("failed to read checkpoint blobs: {e}"))).await;
                                    return;
                                }
                            }
                        }
                        ChildEvent::PauseAcked(payload) => {
                            match load_checkpoint(*payload, &config, CheckpointReason::Pause) {
                                Ok(checkpoint) => {
                                    let _ = updates.send(TrainingUpdate::PauseAcked(Box::new(checkpoint))).await;
                                }
                                Err(e) => {
                                    let _ = updates.send(TrainingUpdate::Failed(format!("failed to read pause checkpoint blobs: {e}"))).await;
                                }
                            }
                            return;
                        }
                        ChildEvent::Completed => {
                            let _ = updates.send(TrainingUpdate::Completed).await;
                            return;
                        }
                        ChildEvent::Failed { message } => {
                            let _ = updates.send(TrainingUpdate::Failed(message)).await;
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
