use super::*;
use crate::anomaly::AnomalyDetector;
use crate::runtime::JobRuntime;
use async_trait::async_trait;
use peft_connectors::{transient, PricingInfo, Resource};
use peft_core::{Config, Job, JobId};
use std::collections::VecDeque;

struct FakeConnector {
    submit_result: parking_lot::Mutex<Option<CoreResult<String>>>,
    statuses: parking_lot::Mutex<VecDeque<CoreResult<ProviderJobStatus>>>,
    artifact_bytes: Vec<u8>,
    cancelled: parking_lot::Mutex<bool>,
}

impl FakeConnector {
    fn new(submit_result: CoreResult<String>, statuses: Vec<CoreResult<ProviderJobStatus>>, artifact_bytes: Vec<u8>) -> Self {
        Self {
            submit_result: parking_lot::Mutex::new(Some(submit_result)),
            statuses: parking_lot::Mutex::new(statuses.into()),
            artifact_bytes,
            cancelled: parking_lot::Mutex::new(false),
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    fn name(&self) -> &str {
        "fake"
    }
    fn display_name(&self) -> &str {
        "Fake"
    }
    fn version(&self) -> &str {
        "0.0.0"
    }
    async fn connect(&self, _credentials: &std::collections::HashMap<String, String>) -> CoreResult<()> {
        Ok(())
    }
    async fn disconnect(&self) -> CoreResult<()> {
        Ok(())
    }
    async fn verify(&self) -> CoreResult<bool> {
        Ok(true)
    }
    async fn submit_job(&self, _config: &Config) -> CoreResult<String> {
        self.submit_result.lock().take().unwrap_or_else(|| Ok("ext-default".to_string()))
    }
    async fn get_job_status(&self, _provider_job_id: &str) -> CoreResult<ProviderJobStatus> {
        let mut statuses = self.statuses.lock();
        match statuses.pop_front() {
            Some(status) => status,
            None => Ok(ProviderJobStatus::Running),
        }
    }
    async fn cancel_job(&self, _provider_job_id: &str) -> CoreResult<()> {
        *self.cancelled.lock() = true;
        Ok(())
    }
    async fn stream_logs(&self, _provider_job_id: &str) -> CoreResult<mpsc::Receiver<String>> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }
    async fn fetch_artifact(&self, _provider_job_id: &str) -> CoreResult<Vec<u8>> {
        Ok(self.artifact_bytes.clone())
    }
    async fn list_resources(&self) -> CoreResult<Vec<Resource>> {
        Ok(vec![])
    }
    async fn get_pricing(&self, _resource_id: &str) -> CoreResult<PricingInfo> {
        Err(CoreError::not_found("no pricing"))
    }
}

fn test_runtime() -> Arc<JobRuntime> {
    let (tx, _rx) = mpsc::unbounded_channel();
    let job = Job::new(JobId::new("job-1"), Config::builder().build(), 0);
    Arc::new(JobRuntime::new(job, Arc::new(AnomalyDetector::default()), tx))
}

/// Advance the paused clock past one poll interval and let the status-poll
/// task observe it.
async fn tick() {
    tokio::time::advance(POLL_INTERVAL + Duration::from_millis(50)).await;
}

#[tokio::test]
async fn submit_failure_reports_fail_without_spawning_poll() {
    let runtime = test_runtime();
    let (mailbox_tx, mut mailbox_rx) = mpsc::channel(8);
    let connector: Arc<dyn Connector> = Arc::new(FakeConnector::new(Err(transient("no capacity")), vec![], vec![]));
    let dispatcher = ProviderDispatcher::new(tempfile::tempdir().unwrap().path());

    dispatcher
        .submit(runtime, mailbox_tx, connector, "aws".to_string(), Config::builder().build())
        .await;

    let command = mailbox_rx.recv().await.unwrap();
    assert!(matches!(command, JobCommand::Fail { .. }));
}

#[tokio::test(start_paused = true)]
async fn successful_submit_sends_backend_ready_then_completes_with_artifact() {
    let runtime = test_runtime();
    let (mailbox_tx, mut mailbox_rx) = mpsc::channel(8);
    let connector: Arc<dyn Connector> = Arc::new(FakeConnector::new(
        Ok("ext-job-1".to_string()),
        vec![Ok(ProviderJobStatus::Running), Ok(ProviderJobStatus::Completed)],
        b"adapter-weights".to_vec(),
    ));
    let artifacts_dir = tempfile::tempdir().unwrap();
    let dispatcher = ProviderDispatcher::new(artifacts_dir.path());

    dispatcher
        .submit(runtime, mailbox_tx, connector, "aws".to_string(), Config::builder().build())
        .await;

    let ready = mailbox_rx.recv().await.unwrap();
    assert!(matches!(ready, JobCommand::BackendReady { provider_job_id: Some(id) } if id == "ext-job-1"));

    tick().await;
    tick().await;
    let completion = mailbox_rx.recv().await.unwrap();
    match completion {
        JobCommand::Complete { artifact: Some(artifact) } => {
            assert_eq!(artifact.size_bytes, "adapter-weights".len() as u64);
            assert!(artifact.verified);
            assert!(std::path::Path::new(&artifact.path).exists());
        }
        other => panic!("expected Complete with artifact, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn provider_failure_status_reports_fail() {
    let runtime = test_runtime();
    let (mailbox_tx, mut mailbox_rx) = mpsc::channel(8);
    let connector: Arc<dyn Connector> =
        Arc::new(FakeConnector::new(Ok("ext-job-2".to_string()), vec![Ok(ProviderJobStatus::Failed)], vec![]));
    let dispatcher = ProviderDispatcher::new(tempfile::tempdir().unwrap().path());

    dispatcher
        .submit(runtime, mailbox_tx, connector, "gcp".to_string(), Config::builder().build())
        .await;
    mailbox_rx.recv().await.unwrap();

    tick().await;
    let command = mailbox_rx.recv().await.unwrap();
    assert!(matches!(command, JobCommand::Fail { .. }));
}

#[tokio::test(start_paused = true)]
async fn provider_cancelled_status_reports_stop() {
    let runtime = test_runtime();
    let (mailbox_tx, mut mailbox_rx) = mpsc::channel(8);
    let connector: Arc<dyn Connector> =
        Arc::new(FakeConnector::new(Ok("ext-job-3".to_string()), vec![Ok(ProviderJobStatus::Cancelled)], vec![]));
    let dispatcher = ProviderDispatcher::new(tempfile::tempdir().unwrap().path());

    dispatcher
        .submit(runtime, mailbox_tx, connector, "gcp".to_string(), Config::builder().build())
        .await;
    mailbox_rx.recv().await.unwrap();

    tick().await;
    let command = mailbox_rx.recv().await.unwrap();
    assert!(matches!(command, JobCommand::Stop { reason: peft_core::TerminationReason::Stopped }));
}

#[tokio::test(start_paused = true)]
async fn repeated_transient_errors_exhaust_the_failure_budget() {
    let runtime = test_runtime();
    let (mailbox_tx, mut mailbox_rx) = mpsc::channel(8);
    let errors = std::iter::repeat_with(|| Err(transient("provider unreachable"))).take(20).collect();
    let connector: Arc<dyn Connector> = Arc::new(FakeConnector::new(Ok("ext-job-4".to_string()), errors, vec![]));
    let dispatcher = ProviderDispatcher::new(tempfile::tempdir().unwrap().path());

    dispatcher
        .submit(runtime, mailbox_tx, connector, "aws".to_string(), Config::builder().build())
        .await;
    mailbox_rx.recv().await.unwrap();

    let mut command = None;
    let mut elapsed = Duration::ZERO;
    while elapsed < FAILURE_BUDGET + POLL_BACKOFF_CAP * 2 {
        tokio::time::advance(POLL_BACKOFF_CAP).await;
        elapsed += POLL_BACKOFF_CAP;
        if let Ok(received) = mailbox_rx.try_recv() {
            command = Some(received);
            break;
        }
    }

    assert!(matches!(command, Some(JobCommand::Fail { .. })), "expected a Fail command once the failure budget elapsed");
}

#[tokio::test]
async fn cancel_forwards_to_the_connector() {
    let connector = FakeConnector::new(Ok("ext-job-5".to_string()), vec![], vec![]);
    let dispatcher = ProviderDispatcher::new(tempfile::tempdir().unwrap().path());

    dispatcher.cancel(&connector, "ext-job-5").await.unwrap();
    assert!(*connector.cancelled.lock());
}
