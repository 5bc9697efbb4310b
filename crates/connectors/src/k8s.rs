// SPDX-License-Identifier: MIT

//! Kubernetes connector: submits a GPU training job as a batch `Job`.
//! Grounded on the teacher's own `kube`/`k8s-openapi` dependency, already
//! present in `oj-adapters` for container-based agent execution
//! (`KubernetesAdapter`), generalized here from "run an agent pod" to
//! "run a GPU training pod and report its lifecycle".

use crate::connector::{permanent, transient, Connector, ConnectorError, PricingInfo, ProviderJobStatus, Resource, ResourceKind};
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job as K8sJob, JobSpec, JobStatus};
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, PodTemplateSpec, ResourceRequirements};
use kube::api::{Api, DeleteParams, ListParams, LogParams, ObjectMeta, PostParams};
use kube::{Client, ResourceExt};
use parking_lot::RwLock;
use peft_core::Config;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;

/// Kubernetes connector configuration: namespace, GPU resource key, and
/// the container image that runs the training entrypoint.
pub struct KubernetesConfig {
    pub namespace: String,
    pub image: String,
    pub gpu_resource_key: String,
    /// Root of a volume mounted both into training pods and this
    /// connector's own process, used by [`Connector::fetch_artifact`]
    /// (real multi-tenant setups back this with a shared PVC or NFS
    /// mount rather than node-local storage).
    pub shared_artifacts_root: std::path::PathBuf,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            image: "peft-training:latest".to_string(),
            gpu_resource_key: "nvidia.com/gpu".to_string(),
            shared_artifacts_root: std::path::PathBuf::from("/mnt/peft-artifacts"),
        }
    }
}

pub struct KubernetesConnector {
    config: KubernetesConfig,
    client: RwLock<Option<Client>>,
}

impl KubernetesConnector {
    pub fn new(config: KubernetesConfig) -> Self {
        Self { config, client: RwLock::new(None) }
    }

    fn client(&self) -> Result<Client, ConnectorError> {
        self.client.read().clone().ok_or_else(|| permanent("not connected: call connect() first"))
    }

    fn job_name(job_base: &str) -> String {
        format!("peft-train-{job_base}")
    }

    fn job_spec(&self, config: &Config, job_name: &str) -> K8sJob {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "peft-training".to_string());
        labels.insert("peft-job".to_string(), job_name.to_string());

        let mut limits = BTreeMap::new();
        limits.insert(
            self.config.gpu_resource_key.clone(),
            k8s_openapi::apimachinery::pkg::api::resource::Quantity("1".to_string()),
        );

        let container = Container {
            name: "trainer".to_string(),
            image: Some(self.config.image.clone()),
            env: Some(vec![
                k8s_openapi::api::core::v1::EnvVar {
                    name: "PEFT_BASE_MODEL".to_string(),
                    value: Some(config.base_model.clone()),
                    ..Default::default()
                },
                k8s_openapi::api::core::v1::EnvVar {
                    name: "PEFT_DATASET_PATH".to_string(),
                    value: Some(config.dataset_path.clone()),
                    ..Default::default()
                },
            ]),
            resources: Some(ResourceRequirements { limits: Some(limits), ..Default::default() }),
            ..Default::default()
        };

        K8sJob {
            metadata: ObjectMeta { name: Some(job_name.to_string()), labels: Some(labels.clone()), ..Default::default() },
            spec: Some(JobSpec {
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta { labels: Some(labels), ..Default::default() }),
                    spec: Some(PodSpec {
                        containers: vec![container],
                        restart_policy: Some("Never".to_string()),
                        ..Default::default()
                    }),
                },
                backoff_limit: Some(0),
                ..Default::default()
            }),
            status: None,
        }
    }

    async fn find_pod_name(&self, client: &Client, job_name: &str) -> Result<String, ConnectorError> {
        let pods: Api<Pod> = Api::namespaced(client.clone(), &self.config.namespace);
        let list = pods
            .list(&ListParams::default().labels(&format!("peft-job={job_name}")))
            .await
            .map_err(|e| transient(format!("listing pods failed: {e}")))?;
        list.items
            .into_iter()
            .next()
            .map(|p| p.name_any())
            .ok_or_else(|| transient("no pod scheduled yet for job"))
    }

    fn status_from(status: &JobStatus) -> ProviderJobStatus {
        if status.succeeded.unwrap_or(0) > 0 {
            ProviderJobStatus::Completed
        } else if status.failed.unwrap_or(0) > 0 {
            ProviderJobStatus::Failed
        } else if status.active.unwrap_or(0) > 0 {
            ProviderJobStatus::Running
        } else {
            ProviderJobStatus::Pending
        }
    }
}

#[async_trait]
impl Connector for KubernetesConnector {
    fn name(&self) -> &str {
        "kubernetes"
    }

    fn display_name(&self) -> &str {
        "Kubernetes GPU cluster"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    async fn connect(&self, _credentials: &HashMap<String, String>) -> Result<(), ConnectorError> {
        let client = Client::try_default().await.map_err(|e| transient(format!("kube client init failed: {e}")))?;
        *self.client.write() = Some(client);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        *self.client.write() = None;
        Ok(())
    }

    async fn verify(&self) -> Result<bool, ConnectorError> {
        let client = self.client()?;
        let pods: Api<Pod> = Api::namespaced(client, &self.config.namespace);
        Ok(pods.list(&ListParams::default().limit(1)).await.is_ok())
    }

    async fn submit_job(&self, config: &Config) -> Result<String, ConnectorError> {
        let client = self.client()?;
        let job_name = Self::job_name(&uuid::Uuid::new_v4().to_string()[..8]);
        let jobs: Api<K8sJob> = Api::namespaced(client, &self.config.namespace);
        jobs.create(&PostParams::default(), &self.job_spec(config, &job_name))
            .await
            .map_err(|e| permanent(format!("job creation rejected: {e}")))?;
        Ok(job_name)
    }

    async fn get_job_status(&self, provider_job_id: &str) -> Result<ProviderJobStatus, ConnectorError> {
        let client = self.client()?;
        let jobs: Api<K8sJob> = Api::namespaced(client, &self.config.namespace);
        let job = jobs.get(provider_job_id).await.map_err(|e| transient(format!("job lookup failed: {e}")))?;
        Ok(job.status.as_ref().map(Self::status_from).unwrap_or(ProviderJobStatus::Pending))
    }

    async fn cancel_job(&self, provider_job_id: &str) -> Result<(), ConnectorError> {
        let client = self.client()?;
        let jobs: Api<K8sJob> = Api::namespaced(client, &self.config.namespace);
        jobs.delete(provider_job_id, &DeleteParams::background())
            .await
            .map_err(|e| transient(format!("job deletion failed: {e}")))?;
        Ok(())
    }

    async fn stream_logs(&self, provider_job_id: &str) -> Result<mpsc::Receiver<String>, ConnectorError> {
        let client = self.client()?;
        let pod_name = self.find_pod_name(&client, provider_job_id).await?;
        let namespace = self.config.namespace.clone();
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let pods: Api<Pod> = Api::namespaced(client, &namespace);
            let params = LogParams { follow: true, container: Some("trainer".to_string()), ..Default::default() };
            let Ok(mut stream) = pods.log_stream(&pod_name, &params).await else { return };
            use futures_util::StreamExt as _;
            while let Some(Ok(bytes)) = stream.next().await {
                if let Ok(text) = std::str::from_utf8(&bytes) {
                    for line in text.lines() {
                        if tx.send(line.to_string()).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn fetch_artifact(&self, provider_job_id: &str) -> Result<Vec<u8>, ConnectorError> {
        let path = self.config.shared_artifacts_root.join(provider_job_id).join("adapter_model.safetensors");
        tokio::fs::read(&path).await.map_err(|e| transient(format!("artifact not yet on shared volume: {e}")))
    }

    async fn list_resources(&self) -> Result<Vec<Resource>, ConnectorError> {
        let client = self.client()?;
        let nodes: Api<k8s_openapi::api::core::v1::Node> = Api::all(client);
        let list = nodes.list(&ListParams::default()).await.map_err(|e| transient(format!("node listing failed: {e}")))?;
        Ok(list
            .items
            .into_iter()
            .map(|node| {
                let name = node.name_any();
                let capacity = node.status.as_ref().and_then(|s| s.capacity.clone()).unwrap_or_default();
                let gpu_count = capacity
                    .get(&self.config.gpu_resource_key)
                    .and_then(|q| q.0.parse::<u32>().ok())
                    .unwrap_or(0);
                Resource {
                    id: name.clone(),
                    name,
                    kind: ResourceKind::Gpu,
                    gpu_type: None,
                    gpu_count,
                    vram_gb: 0,
                    cpu_cores: 0,
                    ram_gb: 0,
                    available: gpu_count > 0,
                    region: None,
                }
            })
            .collect())
    }

    async fn get_pricing(&self, _resource_id: &str) -> Result<PricingInfo, ConnectorError> {
        // Self-hosted clusters have no metered price; the control plane
        // treats on-prem capacity as zero marginal cost.
        Ok(PricingInfo {
            price_per_hour: 0.0,
            billing_increment_seconds: 3600,
            minimum_charge_seconds: 0,
            spot_available: false,
            spot_price_per_hour: None,
        })
    }
}

#[cfg(test)]
#[path = "k8s_tests.rs"]
mod tests;
