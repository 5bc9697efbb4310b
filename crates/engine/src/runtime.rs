// SPDX-License-Identifier: MIT

//! The per-job owner task (§4.F). Generalized from the teacher's
//! `oj-engine::runtime::Runtime<S, A, N, C>`: one actor per job holds the
//! only mutable handle to its [`Job`], processes a typed mailbox of
//! [`JobCommand`]s, and asks its host to perform side effects by sending
//! [`Effect`]s rather than performing them inline.

use crate::anomaly::AnomalyDetector;
use peft_core::{
    Anomaly, Artifact, Checkpoint, CheckpointHandle, CoreError, CoreResult, Effect, ErrorKind,
    Event, Job, JobId, JobState, MetricsSample, Notification, TerminationReason,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Messages a [`JobRuntime`]'s mailbox accepts (§4.F, §9: "pause/resume
/// become in-band messages with explicit ack").
pub enum JobCommand {
    Start,
    BackendReady { provider_job_id: Option<String> },
    IngestSample { sample: MetricsSample, ack: oneshot::Sender<CoreResult<Vec<Anomaly>>> },
    RequestPause,
    PauseAcked { checkpoint: Box<Checkpoint>, handle: CheckpointHandle },
    PauseTimedOut,
    Resume,
    Stop { reason: TerminationReason },
    Complete { artifact: Option<Artifact> },
    Fail { message: String, kind: ErrorKind },
    AnomalyRecovery { anomaly: Anomaly },
    Shutdown { ack: oneshot::Sender<()> },
}

/// Runtime-local hyperparameter overrides applied by the automatic
/// recovery hook (§4.F). `Config` itself stays immutable on the `Job`;
/// these are layered on top when constructing the effective config for
/// the next `SubmitJob`/resume effect, and threaded through `Config::vars`
/// so the training driver can observe them without a core schema change.
#[derive(Debug)]
struct Overrides {
    learning_rate_scale: parking_lot::Mutex<f64>,
    batch_size: AtomicU32,
    gradient_clipping: std::sync::atomic::AtomicBool,
}

impl Default for Overrides {
    fn default() -> Self {
        Self { learning_rate_scale: parking_lot::Mutex::new(1.0), batch_size: AtomicU32::new(0), gradient_clipping: std::sync::atomic::AtomicBool::new(false) }
    }
}

/// Owns one job's mutable state and mailbox. Never accessed concurrently
/// from more than one task: all mutation flows through `handle()`.
pub struct JobRuntime {
    job: RwLock<Job>,
    anomalies: Arc<AnomalyDetector>,
    effects: mpsc::UnboundedSender<Effect>,
    overrides: Overrides,
}

impl JobRuntime {
    pub fn new(job: Job, anomalies: Arc<AnomalyDetector>, effects: mpsc::UnboundedSender<Effect>) -> Self {
        let batch_size = job.config.batch_size;
        let runtime = Self { job: RwLock::new(job), anomalies, effects, overrides: Overrides::default() };
        runtime.overrides.batch_size.store(batch_size, Ordering::SeqCst);
        runtime
    }

    pub fn snapshot(&self) -> Job {
        self.job.read().clone()
    }

    fn job_id(&self) -> JobId {
        self.job.read().id.clone()
    }

    fn emit(&self, effect: Effect) {
        let _ = self.effects.send(effect);
    }

    fn transition(&self, to: JobState, now_ms: u64) -> CoreResult<()> {
        let job_id = {
            let mut job = self.job.write();
            if !job.state.can_transition_to(to) {
                return Err(CoreError::illegal_state(format!("job {} cannot transition from {} to {to}", job.id, job.state)));
            }
            job.state = to;
            match to {
                JobState::Running if job.started_at_ms.is_none() => job.started_at_ms = Some(now_ms),
                JobState::Paused => job.paused_at_ms = Some(now_ms),
                JobState::Completed | JobState::Failed | JobState::Stopped => job.completed_at_ms = Some(now_ms),
                _ => {}
            }
            job.id.clone()
        };
        self.emit(Effect::Emit { event: Event::JobTransitioned { job_id, to, at_ms: now_ms } });
        Ok(())
    }

    /// Effective config for the next submit/resume: the job's immutable
    /// `Config`, with any automatic-recovery overrides layered in via
    /// `vars`.
    pub fn effective_config(&self) -> peft_core::Config {
        let mut config = self.job.read().config.clone();
        let lr_scale = *self.overrides.learning_rate_scale.lock();
        if lr_scale != 1.0 {
            config.learning_rate *= lr_scale;
        }
        let batch_size = self.overrides.batch_size.load(Ordering::SeqCst);
        if batch_size > 0 {
            config.batch_size = batch_size;
        }
        if self.overrides.gradient_clipping.load(Ordering::SeqCst) {
            config.vars.insert("gradient_clipping".to_string(), "enabled".to_string());
        }
        config
    }

    pub fn start(&self, now_ms: u64) -> CoreResult<()> {
        self.transition(JobState::Initializing, now_ms)?;
        self.emit(Effect::SubmitJob { job_id: self.job_id(), config: self.effective_config() });
        Ok(())
    }

    pub fn backend_ready(&self, provider_job_id: Option<String>, now_ms: u64) -> CoreResult<()> {
        if let Some(provider_job_id) = &provider_job_id {
            let mut job = self.job.write();
            job.provider_job_id = Some(provider_job_id.clone());
        }
        self.transition(JobState::Running, now_ms)?;
        if let (Some(provider), Some(provider_job_id)) = (self.job.read().provider.clone(), provider_job_id) {
            self.emit(Effect::SetPollTimer { job_id: self.job_id(), duration: std::time::Duration::from_secs(10) });
            self.emit(Effect::PollProviderStatus { job_id: self.job_id(), provider, provider_job_id });
        }
        Ok(())
    }

    /// Ingest one training sample (§4.F "step event"): updates history,
    /// runs anomaly detection, and applies any automatic recovery actions
    /// the detected anomalies carry.
    pub fn ingest_sample(&self, sample: MetricsSample, now_ms: u64) -> CoreResult<Vec<Anomaly>> {
        {
            let job = self.job.read();
            if job.state != JobState::Running {
                return Err(CoreError::illegal_state(format!("cannot ingest a sample while job is {}", job.state)));
            }
        }

        let job_id = self.job_id();
        let anomalies = self.anomalies.check_all(&job_id, &sample);

        {
            let mut job = self.job.write();
            if !job.metrics_history.push(sample.clone()) {
                return Err(CoreError::validation(format!("sample step {} is not strictly greater than the last recorded step", sample.step)));
            }
            job.current_metrics = Some(sample.clone());
        }
        self.emit(Effect::Emit { event: Event::MetricsIngested { job_id: job_id.clone(), sample } });

        for anomaly in &anomalies {
            self.emit(Effect::Emit { event: Event::AnomalyDetected { job_id: job_id.clone(), anomaly: anomaly.clone() } });
            self.apply_recovery(anomaly, now_ms)?;
        }

        Ok(anomalies)
    }

    /// Apply every `automatic=true` suggested action on `anomaly` (§4.F
    /// recovery hook). Unknown automatic actions are ignored defensively
    /// rather than treated as a failure — a future anomaly kind may carry
    /// automatic actions this runtime doesn't yet know how to execute.
    fn apply_recovery(&self, anomaly: &Anomaly, now_ms: u64) -> CoreResult<()> {
        for action in anomaly.suggested_actions.iter().filter(|a| a.automatic) {
            match action.description.as_str() {
                "reduce_batch_size" => {
                    let current = self.overrides.batch_size.load(Ordering::SeqCst).max(1);
                    self.overrides.batch_size.store((current / 2).max(1), Ordering::SeqCst);
                }
                "reduce_learning_rate" => {
                    let mut scale = self.overrides.learning_rate_scale.lock();
                    *scale *= 0.5;
                }
                "enable_gradient_clipping" => {
                    self.overrides.gradient_clipping.store(true, Ordering::SeqCst);
                }
                "reload_last_checkpoint" => self.reload_from_checkpoint(now_ms)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// §4.F recovery hook, `reload_last_checkpoint`: re-enter INITIALIZING
    /// via the same RUNNING -> PAUSED -> INITIALIZING path a manual
    /// pause/resume takes (the existing checkpoint is reused rather than
    /// a fresh one written, since recovery reloads, it doesn't snapshot).
    /// With no checkpoint to reload, the job fails outright (S4).
    fn reload_from_checkpoint(&self, now_ms: u64) -> CoreResult<()> {
        let has_checkpoint = self.job.read().checkpoint_handle.is_some();
        if !has_checkpoint {
            return self.fail(
                now_ms,
                "anomaly recovery requested a checkpoint reload but no checkpoint exists for this job".to_string(),
                ErrorKind::NotFound,
            );
        }
        self.transition(JobState::Paused, now_ms)?;
        self.transition(JobState::Initializing, now_ms)?;
        self.emit(Effect::SubmitJob { job_id: self.job_id(), config: self.effective_config() });
        Ok(())
    }

    /// Mark a cooperative pause request outstanding (§4.F pause
    /// semantics). The actual RUNNING -> PAUSED transition happens once
    /// the driver acks via [`Self::pause_acked`] or the caller gives up
    /// via [`Self::pause_timed_out`].
    pub fn request_pause(&self) -> CoreResult<()> {
        let mut job = self.job.write();
        if job.state != JobState::Running {
            return Err(CoreError::illegal_state(format!("cannot pause job in state {}", job.state)));
        }
        job.pause_requested = true;
        Ok(())
    }

    pub fn pause_acked(&self, checkpoint: Checkpoint, handle: CheckpointHandle, now_ms: u64) -> CoreResult<()> {
        {
            let mut job = self.job.write();
            job.pause_requested = false;
            job.checkpoint_handle = Some(handle.clone());
        }
        self.transition(JobState::Paused, now_ms)?;
        self.emit(Effect::Emit { event: Event::CheckpointWritten { job_id: self.job_id(), handle } });
        self.emit(Effect::WriteCheckpoint { job_id: self.job_id(), checkpoint });
        Ok(())
    }

    /// The pause ack never arrived within the timeout (§4.F: "on expiry
    /// the caller receives a timeout error but the job remains RUNNING").
    pub fn pause_timed_out(&self) -> CoreResult<()> {
        let mut job = self.job.write();
        job.pause_requested = false;
        Err(CoreError::timeout(format!("pause request for job {} timed out waiting for driver ack", job.id)))
    }

    pub fn resume(&self, now_ms: u64) -> CoreResult<()> {
        self.transition(JobState::Initializing, now_ms)
    }

    /// Periodic scheduled checkpoint, reported by the driver separately
    /// from a pause ack (§4.F: "trigger checkpoint store every
    /// save_steps").
    pub fn checkpoint_saved(&self, handle: CheckpointHandle) {
        {
            let mut job = self.job.write();
            job.checkpoint_handle = Some(handle.clone());
        }
        self.emit(Effect::Emit { event: Event::CheckpointWritten { job_id: self.job_id(), handle } });
    }

    /// Append a delivered notification to the job's in-memory record and
    /// emit it for durable replay. The host (not this runtime) decides
    /// when a notification is warranted — via `NotificationEngine` — and
    /// calls this once delivery succeeds, the same direct-mutation shape
    /// as [`Self::checkpoint_saved`].
    pub fn record_notification(&self, notification: Notification) {
        {
            let mut job = self.job.write();
            job.notifications.push(notification.clone());
        }
        self.emit(Effect::Emit { event: Event::NotificationSent { job_id: self.job_id(), notification } });
    }

    pub fn stop(&self, reason: TerminationReason, now_ms: u64) -> CoreResult<()> {
        let (provider, provider_job_id) = {
            let job = self.job.read();
            (job.provider.clone(), job.provider_job_id.clone())
        };
        self.transition(JobState::Stopped, now_ms)?;
        if let TerminationReason::Failed(message) = reason {
            let mut job = self.job.write();
            job.error_message = Some(message);
        }
        if let (Some(provider), Some(provider_job_id)) = (provider, provider_job_id) {
            self.emit(Effect::CancelProviderJob { job_id: self.job_id(), provider, provider_job_id });
        }
        self.emit(Effect::CancelPollTimer { job_id: self.job_id() });
        Ok(())
    }

    pub fn complete(&self, artifact: Option<Artifact>, now_ms: u64) -> CoreResult<()> {
        self.transition(JobState::Completed, now_ms)?;
        self.emit(Effect::CancelPollTimer { job_id: self.job_id() });
        if let Some(provider_job_id) = self.job.read().provider_job_id.clone() {
            if artifact.is_none() {
                if let Some(provider) = self.job.read().provider.clone() {
                    self.emit(Effect::DownloadArtifact { job_id: self.job_id(), provider, provider_job_id });
                }
            }
        }
        if let Some(artifact) = artifact {
            let mut job = self.job.write();
            job.artifact_info = Some(artifact.clone());
            drop(job);
            self.emit(Effect::Emit { event: Event::ArtifactRecorded { job_id: self.job_id(), artifact } });
        }

        let analysis = crate::quality::analyze(&self.job.read());
        if let Some(analysis) = analysis {
            {
                let mut job = self.job.write();
                job.quality_analysis = Some(analysis.clone());
            }
            self.emit(Effect::Emit { event: Event::QualityAnalysisRecorded { job_id: self.job_id(), analysis } });
        }
        Ok(())
    }

    /// Record an artifact fetched after the job already reached COMPLETED
    /// (§4.G: `complete()` with no artifact in hand requests a deferred
    /// download). Direct mutation, same shape as [`Self::checkpoint_saved`]
    /// — the job is already terminal, so there is no transition to drive.
    pub fn record_artifact(&self, artifact: Artifact) {
        {
            let mut job = self.job.write();
            job.artifact_info = Some(artifact.clone());
        }
        self.emit(Effect::Emit { event: Event::ArtifactRecorded { job_id: self.job_id(), artifact } });
    }

    pub fn fail(&self, now_ms: u64, message: String, kind: ErrorKind) -> CoreResult<()> {
        {
            let mut job = self.job.write();
            job.error_message = Some(message.clone());
        }
        self.transition(JobState::Failed, now_ms)?;
        self.emit(Effect::CancelPollTimer { job_id: self.job_id() });
        self.emit(Effect::Emit { event: Event::ErrorRecorded { job_id: self.job_id(), message, kind } });
        Ok(())
    }

    /// Drive this runtime's mailbox until a [`JobCommand::Shutdown`]
    /// arrives or the sender side is dropped. `now_ms` is supplied by the
    /// caller per command rather than read from the wall clock here, so
    /// the runtime stays testable against a [`peft_core::FakeClock`].
    pub async fn run(self: Arc<Self>, mut mailbox: mpsc::Receiver<JobCommand>, now_ms: impl Fn() -> u64) {
        while let Some(command) = mailbox.recv().await {
            match command {
                JobCommand::Start => {
                    if let Err(e) = self.start(now_ms()) {
                        tracing::warn!(error = %e, "start failed");
                    }
                }
                JobCommand::BackendReady { provider_job_id } => {
                    if let Err(e) = self.backend_ready(provider_job_id, now_ms()) {
                        tracing::warn!(error = %e, "backend_ready failed");
                    }
                }
                JobCommand::IngestSample { sample, ack } => {
                    let result = self.ingest_sample(sample, now_ms());
                    let _ = ack.send(result);
                }
                JobCommand::RequestPause => {
                    if let Err(e) = self.request_pause() {
                        tracing::warn!(error = %e, "request_pause failed");
                    }
                }
                JobCommand::PauseAcked { checkpoint, handle } => {
                    if let Err(e) = self.pause_acked(*checkpoint, handle, now_ms()) {
                        tracing::warn!(error = %e, "pause_acked failed");
                    }
                }
                JobCommand::PauseTimedOut => {
                    let _ = self.pause_timed_out();
                }
                JobCommand::Resume => {
                    if let Err(e) = self.resume(now_ms()) {
                        tracing::warn!(error = %e, "resume failed");
                    }
                }
                JobCommand::Stop { reason } => {
                    if let Err(e) = self.stop(reason, now_ms()) {
                        tracing::warn!(error = %e, "stop failed");
                    }
                }
                JobCommand::Complete { artifact } => {
                    if let Err(e) = self.complete(artifact, now_ms()) {
                        tracing::warn!(error = %e, "complete failed");
                    }
                }
                JobCommand::Fail { message, kind } => {
                    if let Err(e) = self.fail(now_ms(), message, kind) {
                        tracing::warn!(error = %e, "fail failed");
                    }
                }
                JobCommand::AnomalyRecovery { anomaly } => {
                    if let Err(e) = self.apply_recovery(&anomaly, now_ms()) {
                        tracing::warn!(error = %e, "anomaly recovery failed");
                    }
                }
                JobCommand::Shutdown { ack } => {
                    let _ = ack.send(());
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
