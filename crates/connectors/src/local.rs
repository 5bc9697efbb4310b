// SPDX-License-Identifier: MIT

//! The local execution backend's external collaborator contract (§9 open
//! question 3): the actual PEFT training loop is explicitly out of scope
//! (Non-goal: "performing the fine-tuning math itself"). This module
//! defines the message contract a real training driver would implement
//! and a thin [`LocalDriver`] that bridges it to `peft-engine`'s job
//! runtime — it is never a synthetic loss-curve simulator.

use async_trait::async_trait;
use peft_core::{Checkpoint, Config, MetricsSample};
use tokio::sync::mpsc;

/// Commands the job runtime sends to a running [`TrainingDriver`] task.
/// Pause/stop are cooperative: the driver observes them at its next
/// checkpoint boundary rather than being torn down mid-step (§4.F pause
/// semantics).
#[derive(Debug, Clone)]
pub enum TrainingCommand {
    Pause,
    Stop,
}

/// Updates a [`TrainingDriver`] reports back to the job runtime.
#[derive(Debug, Clone)]
pub enum TrainingUpdate {
    Sample(MetricsSample),
    /// The driver reached a `checkpoint_steps` boundary during normal
    /// running and wrote a scheduled checkpoint.
    CheckpointSaved(Box<Checkpoint>),
    /// The driver observed a pending [`TrainingCommand::Pause`] and wrote
    /// a pause-reason checkpoint at the last completed step boundary.
    PauseAcked(Box<Checkpoint>),
    Completed,
    Failed(String),
}

/// External collaborator contract for the actual training loop (§6).
/// `peft-engine`'s runtime drives a driver instance per local job; the
/// driver owns the model/optimizer state and the core never inspects it.
#[async_trait]
pub trait TrainingDriver: Send + Sync + 'static {
    /// Run (or resume, if `resume_from` is set) training to completion,
    /// a pause ack, or a failure, streaming [`TrainingUpdate`]s on
    /// `updates` and observing `commands` at checkpoint boundaries.
    async fn run(
        &self,
        config: Config,
        resume_from: Option<Checkpoint>,
        commands: mpsc::Receiver<TrainingCommand>,
        updates: mpsc::Sender<TrainingUpdate>,
    );
}

/// Bridges a [`TrainingDriver`] implementation to the job runtime for the
/// `local` execution backend. Owns the command/update channel pair for a
/// single job's driver task.
pub struct LocalDriver<D: TrainingDriver> {
    driver: std::sync::Arc<D>,
}

impl<D: TrainingDriver> LocalDriver<D> {
    pub fn new(driver: std::sync::Arc<D>) -> Self {
        Self { driver }
    }

    /// Spawn the driver task, returning the command sender the runtime
    /// uses to request pause/stop and the update receiver it polls for
    /// samples and terminal outcomes.
    pub fn spawn(
        &self,
        config: Config,
        resume_from: Option<Checkpoint>,
    ) -> (mpsc::Sender<TrainingCommand>, mpsc::Receiver<TrainingUpdate>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (update_tx, update_rx) = mpsc::channel(64);
        let driver = self.driver.clone();
        tokio::spawn(async move {
            driver.run(config, resume_from, cmd_rx, update_tx).await;
        });
        (cmd_tx, update_rx)
    }
}

/// Test-only double that replays caller-supplied samples on demand. This
/// is a test fixture, not a production training-loop simulator — it is
/// never compiled into a release build.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeTrainingDriver {
    samples: parking_lot::Mutex<Vec<MetricsSample>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeTrainingDriver {
    pub fn new(samples: Vec<MetricsSample>) -> Self {
        Self { samples: parking_lot::Mutex::new(samples) }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl TrainingDriver for FakeTrainingDriver {
    async fn run(
        &self,
        _config: Config,
        _resume_from: Option<Checkpoint>,
        mut commands: mpsc::Receiver<TrainingCommand>,
        updates: mpsc::Sender<TrainingUpdate>,
    ) {
        let samples = std::mem::take(&mut *self.samples.lock());
        for sample in samples {
            if let Ok(cmd) = commands.try_recv() {
                match cmd {
                    TrainingCommand::Pause => {
                        let checkpoint = Checkpoint::builder().step(sample.step).loss(sample.loss).build();
                        let _ = updates.send(TrainingUpdate::PauseAcked(Box::new(checkpoint))).await;
                        return;
                    }
                    TrainingCommand::Stop => return,
                }
            }
            if updates.send(TrainingUpdate::Sample(sample)).await.is_err() {
                return;
            }
        }
        let _ = updates.send(TrainingUpdate::Completed).await;
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
