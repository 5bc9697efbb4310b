// SPDX-License-Identifier: MIT

//! Generic REST [`Connector`] reference implementation, genericized from
//! the method shapes of the original `huggingface_connector.py` —
//! illustrative plumbing only. Individual cloud APIs' wire formats are a
//! stated Non-goal; this connector exists to show how a real one plugs
//! into the trait, not to implement any particular provider.

use crate::connector::{permanent, transient, Connector, ConnectorError, PricingInfo, ProviderJobStatus, Resource};
use async_trait::async_trait;
use parking_lot::RwLock;
use peft_core::Config;
use reqwest::StatusCode;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// A connector that submits jobs to an arbitrary HTTP API speaking a
/// `{base_url}/jobs`-shaped REST contract. Endpoint paths and payload
/// shapes are configuration, not hardcoded per-provider logic — that is
/// the genericization the Non-goal calls for.
pub struct HttpConnector {
    name: String,
    display_name: String,
    base_url: String,
    client: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl HttpConnector {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            token: RwLock::new(None),
        }
    }

    fn require_token(&self) -> Result<String, ConnectorError> {
        self.token.read().clone().ok_or_else(|| permanent("not connected: call connect() first"))
    }

    /// Map an HTTP status to §7's transient/permanent classification:
    /// "the core treats HTTP 5xx / timeouts / connection-reset as
    /// transient, explicit rejections as permanent".
    fn classify_status(status: StatusCode, body: &str) -> ConnectorError {
        if status.is_server_error() {
            transient(format!("provider returned {status}: {body}"))
        } else {
            permanent(format!("provider rejected request ({status}): {body}"))
        }
    }
}

#[async_trait]
impl Connector for HttpConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    async fn connect(&self, credentials: &HashMap<String, String>) -> Result<(), ConnectorError> {
        let token = credentials
            .get("api_token")
            .ok_or_else(|| permanent("missing required credential: api_token"))?;
        *self.token.write() = Some(token.clone());
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        *self.token.write() = None;
        Ok(())
    }

    async fn verify(&self) -> Result<bool, ConnectorError> {
        let token = self.require_token()?;
        let resp = self
            .client
            .get(format!("{}/whoami", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transient(format!("verify request failed: {e}")))?;
        Ok(resp.status().is_success())
    }

    async fn submit_job(&self, config: &Config) -> Result<String, ConnectorError> {
        let token = self.require_token()?;
        let resp = self
            .client
            .post(format!("{}/jobs", self.base_url))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "base_model": config.base_model,
                "dataset_path": config.dataset_path,
                "resource_id": config.resource_id,
            }))
            .send()
            .await
            .map_err(|e| transient(format!("submit request failed: {e}")))?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Self::classify_status(status, &body.to_string()));
        }
        body.get("job_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| permanent("provider response missing job_id"))
    }

    async fn get_job_status(&self, provider_job_id: &str) -> Result<ProviderJobStatus, ConnectorError> {
        let token = self.require_token()?;
        let resp = self
            .client
            .get(format!("{}/jobs/{provider_job_id}", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transient(format!("status request failed: {e}")))?;
        let status = resp.status();
        let body: serde_json::Value = resp.json().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Self::classify_status(status, &body.to_string()));
        }
        match body.get("status").and_then(|v| v.as_str()) {
            Some("pending") => Ok(ProviderJobStatus::Pending),
            Some("running") => Ok(ProviderJobStatus::Running),
            Some("completed") => Ok(ProviderJobStatus::Completed),
            Some("failed") => Ok(ProviderJobStatus::Failed),
            Some("cancelled") => Ok(ProviderJobStatus::Cancelled),
            other => Err(permanent(format!("unrecognized provider status: {other:?}"))),
        }
    }

    async fn cancel_job(&self, provider_job_id: &str) -> Result<(), ConnectorError> {
        let token = self.require_token()?;
        let resp = self
            .client
            .post(format!("{}/jobs/{provider_job_id}/cancel", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transient(format!("cancel request failed: {e}")))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Self::classify_status(resp.status(), ""))
        }
    }

    async fn stream_logs(&self, provider_job_id: &str) -> Result<mpsc::Receiver<String>, ConnectorError> {
        let token = self.require_token()?;
        let url = format!("{}/jobs/{provider_job_id}/logs", self.base_url);
        let client = self.client.clone();
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let Ok(resp) = client.get(&url).bearer_auth(token).send().await else { return };
            let Ok(text) = resp.text().await else { return };
            for line in text.lines() {
                if tx.send(line.to_string()).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }

    async fn fetch_artifact(&self, provider_job_id: &str) -> Result<Vec<u8>, ConnectorError> {
        let token = self.require_token()?;
        let resp = self
            .client
            .get(format!("{}/jobs/{provider_job_id}/artifact", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transient(format!("artifact fetch failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(Self::classify_status(resp.status(), ""));
        }
        resp.bytes().await.map(|b| b.to_vec()).map_err(|e| transient(format!("artifact body read failed: {e}")))
    }

    async fn list_resources(&self) -> Result<Vec<Resource>, ConnectorError> {
        let token = self.require_token()?;
        let resp = self
            .client
            .get(format!("{}/resources", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transient(format!("resources request failed: {e}")))?;
        resp.json::<Vec<Resource>>().await.map_err(|e| permanent(format!("malformed resources response: {e}")))
    }

    async fn get_pricing(&self, resource_id: &str) -> Result<PricingInfo, ConnectorError> {
        let token = self.require_token()?;
        let resp = self
            .client
            .get(format!("{}/resources/{resource_id}/pricing", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transient(format!("pricing request failed: {e}")))?;
        resp.json::<PricingInfo>().await.map_err(|e| permanent(format!("malformed pricing response: {e}")))
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
