// SPDX-License-Identifier: MIT

//! Provider-backed job submission, status polling, and artifact retrieval
//! (§4.G). Grounded on `original_source/backend/services/
//! training_orchestration_service.py`'s polling loop.

use crate::runtime::{JobCommand, JobRuntime};
use peft_connectors::{Connector, ProviderJobStatus};
use peft_core::{sha256_hex, Artifact, ArtifactId, ConnectorFailureKind, CoreError, CoreResult, ErrorKind, TerminationReason};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const POLL_INTERVAL: Duration = Duration::from_secs(10);
const POLL_BACKOFF_CAP: Duration = Duration::from_secs(60);
const FAILURE_BUDGET: Duration = Duration::from_secs(5 * 60);

/// Submits a job to a connector and drives its status-poll and log-stream
/// tasks until a terminal provider status (§4.G).
pub struct ProviderDispatcher {
    artifacts_root: PathBuf,
}

impl ProviderDispatcher {
    pub fn new(artifacts_root: impl Into<PathBuf>) -> Self {
        Self { artifacts_root: artifacts_root.into() }
    }

    /// Submit `config` to `connector` on behalf of `job_id`, then spawn the
    /// log-stream and status-poll tasks. Submission failures are reported
    /// back to the runtime as a `Fail` command rather than propagated,
    /// since the caller has no synchronous path back to the job once its
    /// mailbox command has been dispatched.
    pub async fn submit(
        &self,
        runtime: Arc<JobRuntime>,
        mailbox: mpsc::Sender<JobCommand>,
        connector: Arc<dyn Connector>,
        provider: String,
        config: peft_core::Config,
    ) {
        match connector.submit_job(&config).await {
            Ok(provider_job_id) => {
                let _ = mailbox.send(JobCommand::BackendReady { provider_job_id: Some(provider_job_id.clone()) }).await;
                self.spawn_log_stream(connector.clone(), provider_job_id.clone());
                self.spawn_status_poll(runtime, mailbox, connector, provider, provider_job_id);
            }
            Err(e) => {
                let kind = e.kind.clone();
                let _ = mailbox.send(JobCommand::Fail { message: format!("submit to {provider} failed: {e}"), kind }).await;
            }
        }
    }

    fn spawn_log_stream(&self, connector: Arc<dyn Connector>, provider_job_id: String) {
        tokio::spawn(async move {
            match connector.stream_logs(&provider_job_id).await {
                Ok(mut rx) => {
                    while let Some(line) = rx.recv().await {
                        tracing::debug!(provider_job_id = %provider_job_id, "{line}");
                    }
                }
                Err(e) => tracing::warn!(provider_job_id = %provider_job_id, error = %e, "log stream unavailable"),
            }
        });
    }

    fn spawn_status_poll(
        &self,
        runtime: Arc<JobRuntime>,
        mailbox: mpsc::Sender<JobCommand>,
        connector: Arc<dyn Connector>,
        provider: String,
        provider_job_id: String,
    ) {
        let artifacts_root = self.artifacts_root.clone();
        tokio::spawn(async move {
            let mut interval = POLL_INTERVAL;
            let mut failing_since: Option<tokio::time::Instant> = None;

            loop {
                tokio::time::sleep(interval).await;

                if runtime.snapshot().state.is_terminal() {
                    return;
                }

                match connector.get_job_status(&provider_job_id).await {
                    Ok(ProviderJobStatus::Running) | Ok(ProviderJobStatus::Pending) => {
                        interval = POLL_INTERVAL;
                        failing_since = None;
                    }
                    Ok(ProviderJobStatus::Completed) => {
                        let artifact = fetch_and_verify(&connector, &provider_job_id, &artifacts_root, runtime.snapshot().id.as_str()).await;
                        match artifact {
                            Ok(artifact) => {
                                let _ = mailbox.send(JobCommand::Complete { artifact: Some(artifact) }).await;
                            }
                            Err(e) => {
                                tracing::warn!(provider_job_id = %provider_job_id, error = %e, "artifact download failed; job still completes");
                                let _ = mailbox.send(JobCommand::Complete { artifact: None }).await;
                            }
                        }
                        return;
                    }
                    Ok(ProviderJobStatus::Failed) => {
                        let _ = mailbox
                            .send(JobCommand::Fail {
                                message: format!("provider {provider} reported job failure"),
                                kind: ErrorKind::Connector(ConnectorFailureKind::Permanent),
                            })
                            .await;
                        return;
                    }
                    Ok(ProviderJobStatus::Cancelled) => {
                        let _ = mailbox.send(JobCommand::Stop { reason: TerminationReason::Stopped }).await;
                        return;
                    }
                    Err(e) => {
                        let since = *failing_since.get_or_insert_with(tokio::time::Instant::now);
                        if since.elapsed() > FAILURE_BUDGET {
                            let _ = mailbox
                                .send(JobCommand::Fail {
                                    message: format!("provider {provider} unreachable for over 5 minutes: {e}"),
                                    kind: ErrorKind::Connector(ConnectorFailureKind::Transient),
                                })
                                .await;
                            return;
                        }
                        interval = (interval * 2).min(POLL_BACKOFF_CAP);
                        tracing::warn!(provider = %provider, error = %e, next_poll_secs = interval.as_secs(), "status poll failed, backing off");
                    }
                }
            }
        });
    }

    /// Forward a cancellation to the connector (§4.G: "stop() on a
    /// provider-backed job forwards to the connector's cancel_job"). The
    /// poll task observes the terminal state on its next tick and exits.
    pub async fn cancel(&self, connector: &dyn Connector, provider_job_id: &str) -> CoreResult<()> {
        connector.cancel_job(provider_job_id).await
    }
}

async fn fetch_and_verify(connector: &Arc<dyn Connector>, provider_job_id: &str, artifacts_root: &std::path::Path, job_id: &str) -> CoreResult<Artifact> {
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
        created_at_ms: peft_core::Clock::epoch_ms(&peft_core::SystemClock),
        metadata: std::collections::HashMap::new(),
        verified: false,
    };
    artifact.verify(Some(&sha256));
    Ok(artifact)
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
