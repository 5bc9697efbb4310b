// SPDX-License-Identifier: MIT

//! The in-process façade (§6): `create_job`, `start`, `pause`, `resume`,
//! `stop`, `status`, `subscribe_metrics`, `subscribe_notifications`,
//! `get_artifact`. Wires every other module in this crate plus
//! `peft-connectors`/`peft-storage` into the single entry point a
//! transport layer (CLI, daemon) drives.

use crate::anomaly::AnomalyDetector;
use crate::checkpoint::CheckpointStore;
use crate::dispatch::ProviderDispatcher;
use crate::manager::RunManager;
use crate::metrics::MetricsPipeline;
use crate::notification::NotificationEngine;
use crate::runtime::{JobCommand, JobRuntime};
use parking_lot::RwLock;
use peft_connectors::{
    Connector, ConnectorManager, DndProvider, LocalDriver, NotifyAdapter, TrainingCommand,
    TrainingDriver, TrainingUpdate,
};
use peft_core::{
    sha256_hex, Artifact, ArtifactId, Checkpoint, Clock, ConnectorFailureKind, Config, CoreError,
    CoreResult, ErrorKind, Job, JobId, JobState, MetricsSample, Notification, NotificationKind,
    Severity, Urgency,
};
use peft_storage::DurableStore;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const PAUSE_TIMEOUT: Duration = Duration::from_secs(30);
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(50);
const EFFECT_SUBSCRIBER_CAPACITY: usize = 32;

/// Object-safe erasure of [`LocalDriver`]'s `D: TrainingDriver` generic so
/// [`Orchestrator`] can hold one without a third type parameter for every
/// local-execution job it ever spawns (`Clock` alone already forces it to
/// stay generic; `Clone` makes `dyn Clock` impossible, §9 open question).
trait LocalExecutor: Send + Sync {
    fn spawn_driver(
        &self,
        config: Config,
        resume_from: Option<Checkpoint>,
    ) -> (mpsc::Sender<TrainingCommand>, mpsc::Receiver<TrainingUpdate>);
}

impl<D: TrainingDriver> LocalExecutor for LocalDriver<D> {
    fn spawn_driver(
        &self,
        config: Config,
        resume_from: Option<Checkpoint>,
    ) -> (mpsc::Sender<TrainingCommand>, mpsc::Receiver<TrainingUpdate>) {
        self.spawn(config, resume_from)
    }
}

struct JobHandle {
    runtime: Arc<JobRuntime>,
    mailbox: mpsc::Sender<JobCommand>,
}

/// Everything a job's background tasks (the mailbox loop, the effect
/// loop, the local-driver bridge) need a shared, cheaply-cloned handle
/// to. Kept separate from [`Orchestrator`] so those tasks don't need to
/// be generic over anything beyond `C`/`N`/`D`.
struct Shared<C, N, D> {
    clock: C,
    connectors: Arc<ConnectorManager>,
    checkpoints: Arc<CheckpointStore>,
    artifacts_root: PathBuf,
    dispatcher: Arc<ProviderDispatcher>,
    metrics: Arc<MetricsPipeline>,
    notifications: Arc<NotificationEngine<N, D>>,
    anomalies: Arc<AnomalyDetector>,
    store: Arc<dyn DurableStore>,
    local_executor: Arc<dyn LocalExecutor>,
    notification_subscribers: RwLock<HashMap<String, Vec<mpsc::Sender<Notification>>>>,
}

impl<C: Clock, N: NotifyAdapter, D: DndProvider> Shared<C, N, D> {
    fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    fn publish_notification(&self, job_id: &JobId, notification: Notification) {
        let mut subs = self.notification_subscribers.write();
        if let Some(senders) = subs.get_mut(job_id.as_str()) {
            senders.retain(|tx| match tx.try_send(notification.clone()) {
                Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => !tx.is_closed(),
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
        }
    }
}

/// The in-process implementation of the §6 façade. Generic over the
/// clock and the desktop-notification stack so tests can substitute
/// [`peft_core::FakeClock`] and `peft_connectors::FakeNotifyAdapter`
/// without touching production wiring.
pub struct Orchestrator<C, N, D> {
    shared: Arc<Shared<C, N, D>>,
    manager: Arc<RunManager>,
    jobs: RwLock<HashMap<String, Arc<JobHandle>>>,
}

impl<C, N, D> Orchestrator<C, N, D>
where
    C: Clock + 'static,
    N: NotifyAdapter,
    D: DndProvider,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: C,
        connectors: Arc<ConnectorManager>,
        checkpoints_root: impl Into<PathBuf>,
        artifacts_root: impl Into<PathBuf>,
        notify_adapter: Arc<N>,
        dnd: Arc<D>,
        store: Arc<dyn DurableStore>,
        local_driver: impl TrainingDriver,
    ) -> Self {
        let artifacts_root = artifacts_root.into();
        let shared = Arc::new(Shared {
            clock,
            connectors,
            checkpoints: Arc::new(CheckpointStore::new(checkpoints_root)),
            artifacts_root: artifacts_root.clone(),
            dispatcher: Arc::new(ProviderDispatcher::new(artifacts_root)),
            metrics: Arc::new(MetricsPipeline::new()),
            notifications: Arc::new(NotificationEngine::new(notify_adapter, dnd)),
            anomalies: Arc::new(AnomalyDetector::default()),
            store: store.clone(),
            local_executor: Arc::new(LocalDriver::new(Arc::new(local_driver))),
            notification_subscribers: RwLock::new(HashMap::new()),
        });
        Self { shared, manager: Arc::new(RunManager::new(store)), jobs: RwLock::new(HashMap::new()) }
    }

    fn job(&self, job_id: &str) -> CoreResult<Arc<JobHandle>> {
        self.jobs.read().get(job_id).cloned().ok_or_else(|| CoreError::not_found(format!("job '{job_id}' is not live in this process")))
    }

    /// Validate `config`, persist the creation event, spin up the job's
    /// mailbox loop and effect loop, and register it with the run
    /// manager (§6 `create_job`).
    pub fn create_job(&self, job_id: JobId, config: Config) -> CoreResult<Job> {
        config.validate()?;
        let now_ms = self.shared.now_ms();

        let mut job = Job::new(job_id.clone(), config.clone(), now_ms);
        job.provider = config.backend.provider_name().map(str::to_string);

        self.shared
            .store
            .record(peft_core::Event::JobCreated { job_id: job_id.clone(), config, created_at_ms: now_ms })
            .map_err(|e| CoreError::validation(format!("failed to record job creation: {e}")))?;

        let (effects_tx, effects_rx) = mpsc::unbounded_channel();
        let runtime = Arc::new(JobRuntime::new(job.clone(), self.shared.anomalies.clone(), effects_tx));
        let (mailbox_tx, mailbox_rx) = mpsc::channel(32);

        let mailbox_loop_runtime = runtime.clone();
        let clock = self.shared.clock.clone();
        tokio::spawn(mailbox_loop_runtime.run(mailbox_rx, move || clock.epoch_ms()));

        tokio::spawn(run_effects(self.shared.clone(), runtime.clone(), mailbox_tx.clone(), effects_rx));

        let handle = Arc::new(JobHandle { runtime: runtime.clone(), mailbox: mailbox_tx.clone() });
        self.jobs.write().insert(job_id.as_str().to_string(), handle);
        self.manager.register(job_id, runtime, mailbox_tx);

        Ok(job)
    }

    /// Kick off submission to the job's configured backend (§6 `start`).
    pub async fn start(&self, job_id: &str) -> CoreResult<()> {
        let handle = self.job(job_id)?;
        handle.runtime.start(self.shared.now_ms())
    }

    /// Request a cooperative pause and wait (up to 30s) for the driver to
    /// ack with a checkpoint (§4.F pause semantics, §6 `pause`).
    pub async fn pause(&self, job_id: &str) -> CoreResult<Checkpoint> {
        let handle = self.job(job_id)?;
        handle.runtime.request_pause()?;

        let deadline = tokio::time::Instant::now() + PAUSE_TIMEOUT;
        loop {
            let job = handle.runtime.snapshot();
            if job.state == JobState::Paused {
                let checkpoint_handle = job
                    .checkpoint_handle
                    .ok_or_else(|| CoreError::illegal_state(format!("job {job_id} paused without a checkpoint handle")))?;
                return self.shared.checkpoints.load(&checkpoint_handle);
            }
            if tokio::time::Instant::now() >= deadline {
                let _ = handle.runtime.pause_timed_out();
                return Err(CoreError::timeout(format!("pause request for job {job_id} timed out waiting for an ack")));
            }
            tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
        }
    }

    /// Re-enter INITIALIZING from PAUSED, reloading the last checkpoint
    /// and respawning the local driver (§4.F `resume`). Provider-backed
    /// jobs never reach PAUSED in this connector contract (`Connector`
    /// has no pause operation), so this path is local-only in practice.
    pub async fn resume(&self, job_id: &str) -> CoreResult<()> {
        let handle = self.job(job_id)?;
        handle.runtime.resume(self.shared.now_ms())?;

        let job = handle.runtime.snapshot();
        if job.config.backend.is_local() {
            let resume_from = match &job.checkpoint_handle {
                Some(ckpt_handle) => Some(self.shared.checkpoints.load(ckpt_handle)?),
                None => None,
            };
            spawn_local_job(self.shared.clone(), handle.runtime.clone(), handle.mailbox.clone(), job.id.clone(), job.config.clone(), resume_from);
        }
        handle.runtime.backend_ready(None, self.shared.now_ms())
    }

    /// Best-effort terminate (§6 `stop`). Delegates to the run manager,
    /// which is idempotent on a job with no live mailbox.
    pub async fn stop(&self, job_id: &str) {
        self.manager.cancel(job_id).await;
    }

    /// Merged live/store snapshot (§6 `status`).
    pub fn status(&self, job_id: &str) -> CoreResult<Job> {
        self.manager.details(job_id).ok_or_else(|| CoreError::not_found(format!("job '{job_id}' not found")))
    }

    pub fn subscribe_metrics(&self, job_id: &JobId) -> crate::metrics::MetricsSubscription {
        self.shared.metrics.subscribe(job_id)
    }

    /// Subscribe to every future notification for `job_id` (§6
    /// `subscribe_notifications`). Like metrics, a slow subscriber drops
    /// the newest queued notification rather than backing up delivery.
    pub fn subscribe_notifications(&self, job_id: &JobId) -> mpsc::Receiver<Notification> {
        let (tx, rx) = mpsc::channel(EFFECT_SUBSCRIBER_CAPACITY);
        self.shared.notification_subscribers.write().entry(job_id.as_str().to_string()).or_default().push(tx);
        rx
    }

    pub fn get_artifact(&self, job_id: &str) -> CoreResult<Option<Artifact>> {
        Ok(self.status(job_id)?.artifact_info)
    }

    pub fn manager(&self) -> &Arc<RunManager> {
        &self.manager
    }

    /// Drop the in-process bookkeeping for a terminal job (§4.H cleanup).
    /// The durable record is untouched.
    pub fn cleanup(&self, job_id: &str) {
        self.jobs.write().remove(job_id);
        self.manager.cleanup(job_id);
        self.shared.metrics.clear(&JobId::new(job_id));
        self.shared.anomalies.clear(&JobId::new(job_id));
        self.shared.notifications.clear(&JobId::new(job_id));
        self.shared.notification_subscribers.write().remove(job_id);
    }
}

fn spawn_local_job<C, N, D>(
    shared: Arc<Shared<C, N, D>>,
    runtime: Arc<JobRuntime>,
    mailbox: mpsc::Sender<JobCommand>,
    job_id: JobId,
    config: Config,
    resume_from: Option<Checkpoint>,
) where
    C: Clock + 'static,
    N: NotifyAdapter,
    D: DndProvider,
{
    let (cmd_tx, update_rx) = shared.local_executor.spawn_driver(config, resume_from);
    tokio::spawn(run_local_job(shared, runtime, mailbox, cmd_tx, update_rx, job_id));
}

/// Bridges one job's [`TrainingDriver`] task to its [`JobRuntime`]
/// mailbox: forwards samples through `ingest_sample`, checks progress
/// milestones after each, and relays checkpoint/terminal updates.
async fn run_local_job<C, N, D>(
    shared: Arc<Shared<C, N, D>>,
    runtime: Arc<JobRuntime>,
    mailbox: mpsc::Sender<JobCommand>,
    cmd_tx: mpsc::Sender<TrainingCommand>,
    mut updates: mpsc::Receiver<TrainingUpdate>,
    job_id: JobId,
) where
    C: Clock + 'static,
    N: NotifyAdapter,
    D: DndProvider,
{
    while let Some(update) = updates.recv().await {
        match update {
            TrainingUpdate::Sample(sample) => {
                if !ingest_and_check(&shared, &runtime, &mailbox, sample).await {
                    continue;
                }
                if runtime.snapshot().pause_requested {
                    let _ = cmd_tx.send(TrainingCommand::Pause).await;
                }
            }
            TrainingUpdate::CheckpointSaved(checkpoint) => {
                if let Ok(handle) = shared.checkpoints.save(&job_id, &checkpoint) {
                    runtime.checkpoint_saved(handle);
                } else {
                    tracing::warn!(job_id = %job_id, "failed to persist scheduled checkpoint");
                }
            }
            TrainingUpdate::PauseAcked(checkpoint) => {
                match shared.checkpoints.save(&job_id, &checkpoint) {
                    Ok(handle) => {
                        let _ = mailbox.send(JobCommand::PauseAcked { checkpoint, handle }).await;
                    }
                    Err(e) => tracing::warn!(job_id = %job_id, error = %e, "failed to persist pause checkpoint"),
                }
                return;
            }
            TrainingUpdate::Completed => {
                let _ = mailbox.send(JobCommand::Complete { artifact: None }).await;
                return;
            }
            TrainingUpdate::Failed(message) => {
                let _ = mailbox.send(JobCommand::Fail { message, kind: ErrorKind::Connector(ConnectorFailureKind::Permanent) }).await;
                return;
            }
        }
    }
}

/// Feed one sample through the runtime's mailbox and, if accepted, check
/// for newly crossed progress milestones. Returns whether the sample was
/// accepted (a strictly-increasing-step rejection is logged, not fatal).
async fn ingest_and_check<C, N, D>(shared: &Arc<Shared<C, N, D>>, runtime: &Arc<JobRuntime>, mailbox: &mpsc::Sender<JobCommand>, sample: MetricsSample) -> bool
where
    C: Clock + 'static,
    N: NotifyAdapter,
    D: DndProvider,
{
    let job_id = runtime.snapshot().id.clone();
    shared.metrics.ingest(&job_id, sample.clone());

    let (ack_tx, ack_rx) = oneshot::channel();
    if mailbox.send(JobCommand::IngestSample { sample, ack: ack_tx }).await.is_err() {
        return false;
    }
    let Ok(Ok(_anomalies)) = ack_rx.await else {
        return false;
    };

    let job = runtime.snapshot();
    if let Ok(notifications) = shared.notifications.check_progress(&job).await {
        for notification in notifications {
            runtime.record_notification(notification.clone());
            shared.publish_notification(&job_id, notification);
        }
    }
    true
}

/// Drains one job's effect channel, performing the side effect each
/// [`peft_core::Effect`] requests (§4.F, §4.G). Runs for the lifetime of
/// the job's `effects` sender, i.e. until the runtime (and every clone
/// held by its mailbox loop) is dropped.
async fn run_effects<C, N, D>(
    shared: Arc<Shared<C, N, D>>,
    runtime: Arc<JobRuntime>,
    mailbox: mpsc::Sender<JobCommand>,
    mut effects: mpsc::UnboundedReceiver<peft_core::Effect>,
) where
    C: Clock + 'static,
    N: NotifyAdapter,
    D: DndProvider,
{
    use peft_core::{Effect, Event};

    while let Some(effect) = effects.recv().await {
        match effect {
            Effect::Emit { event } => {
                if let Err(e) = shared.store.record(event.clone()) {
                    tracing::error!(error = %e, "failed to record event to the durable store");
                }
                match event {
                    Event::AnomalyDetected { job_id, anomaly } => {
                        let notification = Notification {
                            kind: NotificationKind::Warning,
                            title: "Training anomaly detected".to_string(),
                            body: anomaly.message.clone(),
                            milestone: None,
                            urgency: if anomaly.severity == Severity::Critical { Urgency::Critical } else { Urgency::Normal },
                            sound: anomaly.severity == Severity::Critical,
                            taskbar_progress: None,
                            respect_dnd: anomaly.severity != Severity::Critical,
                            actions: Vec::new(),
                        };
                        if shared.notifications.notify(notification.clone()).await.is_ok() {
                            runtime.record_notification(notification.clone());
                            shared.publish_notification(&job_id, notification);
                        }
                    }
                    Event::ErrorRecorded { job_id, message, kind } => {
                        // §4.C: most failures are merely urgent; only the kinds
                        // `ErrorKind::is_auto_critical` names (a permanent
                        // connector rejection, an integrity violation) escalate
                        // past that, mirroring notify-rust's own three-level
                        // urgency scale (there is no level above `Critical`).
                        let urgency = if kind.is_auto_critical() { Urgency::Critical } else { Urgency::Normal };
                        let notification = Notification {
                            kind: NotificationKind::Error,
                            title: "Training job failed".to_string(),
                            body: message,
                            milestone: None,
                            urgency,
                            sound: true,
                            taskbar_progress: None,
                            respect_dnd: false,
                            actions: Vec::new(),
                        };
                        if shared.notifications.notify(notification.clone()).await.is_ok() {
                            runtime.record_notification(notification.clone());
                            shared.publish_notification(&job_id, notification);
                        }
                    }
                    _ => {}
                }
            }
            Effect::SubmitJob { job_id, config } => match config.backend.provider_name() {
                None => {
                    spawn_local_job(shared.clone(), runtime.clone(), mailbox.clone(), job_id, config, None);
                    let _ = mailbox.send(JobCommand::BackendReady { provider_job_id: None }).await;
                }
                Some(provider) => match shared.connectors.get_connector(provider) {
                    Some(connector) => {
                        shared.dispatcher.submit(runtime.clone(), mailbox.clone(), connector, provider.to_string(), config).await;
                    }
                    None => {
                        let _ = mailbox
                            .send(JobCommand::Fail { message: format!("connector '{provider}' is not connected"), kind: ErrorKind::NotFound })
                            .await;
                    }
                },
            },
            Effect::CancelProviderJob { provider, provider_job_id, .. } => {
                if let Some(connector) = shared.connectors.get_connector(&provider) {
                    if let Err(e) = shared.dispatcher.cancel(&*connector, &provider_job_id).await {
                        tracing::warn!(provider = %provider, error = %e, "provider cancel failed");
                    }
                }
            }
            Effect::DownloadArtifact { job_id, provider, provider_job_id } => {
                if let Some(connector) = shared.connectors.get_connector(&provider) {
                    match fetch_artifact(&connector, &provider_job_id, &shared.artifacts_root, job_id.as_str(), shared.now_ms()).await {
                        Ok(artifact) => runtime.record_artifact(artifact),
                        Err(e) => tracing::warn!(job_id = %job_id, error = %e, "deferred artifact download failed"),
                    }
                }
            }
            // The local-driver bridge and `ProviderDispatcher::submit` write
            // checkpoints and arm/disarm their own status-poll loops
            // directly; these three effects are kept for hosts that want
            // to observe (or drive) those side channels independently.
            Effect::WriteCheckpoint { .. } | Effect::SetPollTimer { .. } | Effect::CancelPollTimer { .. } | Effect::PollProviderStatus { .. } => {}
        }
    }
}

async fn fetch_artifact(
    connector: &Arc<dyn Connector>,
    provider_job_id: &str,
    artifacts_root: &std::path::Path,
    job_id: &str,
    now_ms: u64,
) -> CoreResult<Artifact> {
    let bytes = connector.fetch_artifact(provider_job_id).await?;
    let dir = artifacts_root.join(job_id);
    std::fs::create_dir_all(&dir).map_err(|e| CoreError::validation(format!("cannot create artifact dir: {e}")))?;
    let path = dir.join("adapter_model.safetensors");
    std::fs::write(&path, &bytes).map_err(|e| CoreError::validation(format!("cannot write artifact: {e}")))?;

    let sha256 = sha256_hex(&bytes);
    let mut artifact = Artifact {
        artifact_id: ArtifactId::new(),
        job_id: job_id.to_string(),
        path: path.to_string_lossy().into_owned(),
        size_bytes: bytes.len() as u64,
        sha256: sha256.clone(),
        created_at_ms: now_ms,
        metadata: HashMap::new(),
        verified: false,
    };
    artifact.verify(Some(&sha256));
    Ok(artifact)
}

#[cfg(test)]
#[path = "facade_tests.rs"]
mod tests;
