// SPDX-License-Identifier: MIT

//! The `Connector` trait every platform backend implements (§4.A),
//! grounded on `original_source/backend/connectors/base.py::PlatformConnector`.

use async_trait::async_trait;
use peft_core::{Config, ConnectorFailureKind, CoreError};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Gpu,
    Cpu,
    Tpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// A unit of compute a connector can place a job on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub kind: ResourceKind,
    pub gpu_type: Option<String>,
    pub gpu_count: u32,
    pub vram_gb: u32,
    pub cpu_cores: u32,
    pub ram_gb: u32,
    pub available: bool,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingInfo {
    pub price_per_hour: f64,
    pub billing_increment_seconds: u32,
    pub minimum_charge_seconds: u32,
    pub spot_available: bool,
    pub spot_price_per_hour: Option<f64>,
}

/// Every fallible connector operation returns this — the dispatcher maps
/// [`ConnectorFailureKind::Transient`] to its retry/backoff policy and
/// [`ConnectorFailureKind::Permanent`] straight to a FAILED transition
/// (§4.G).
pub type ConnectorError = CoreError;

pub fn transient(message: impl Into<String>) -> ConnectorError {
    CoreError::connector(ConnectorFailureKind::Transient, message)
}

pub fn permanent(message: impl Into<String>) -> ConnectorError {
    CoreError::connector(ConnectorFailureKind::Permanent, message)
}

/// The ten operations every platform backend must implement (§4.A).
/// `upload_artifact`/`deploy_model` style registry/inference extensions
/// from the original are out of scope — the Non-goal excludes
/// implementing the individual cloud APIs behind connectors, and the
/// spec's required-operations list stops at these ten.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    fn name(&self) -> &str;
    fn display_name(&self) -> &str;
    fn version(&self) -> &str;

    async fn connect(&self, credentials: &std::collections::HashMap<String, String>) -> Result<(), ConnectorError>;
    async fn disconnect(&self) -> Result<(), ConnectorError>;
    async fn verify(&self) -> Result<bool, ConnectorError>;

    async fn submit_job(&self, config: &Config) -> Result<String, ConnectorError>;
    async fn get_job_status(&self, provider_job_id: &str) -> Result<ProviderJobStatus, ConnectorError>;
    async fn cancel_job(&self, provider_job_id: &str) -> Result<(), ConnectorError>;

    /// Stream log lines as they arrive. Returns the receiving half of a
    /// channel the connector's own task feeds; the channel closes when the
    /// stream ends or the job terminates.
    async fn stream_logs(&self, provider_job_id: &str) -> Result<mpsc::Receiver<String>, ConnectorError>;

    async fn fetch_artifact(&self, provider_job_id: &str) -> Result<Vec<u8>, ConnectorError>;

    async fn list_resources(&self) -> Result<Vec<Resource>, ConnectorError>;
    async fn get_pricing(&self, resource_id: &str) -> Result<PricingInfo, ConnectorError>;
}
