use super::*;
use crate::connector::{PricingInfo, ProviderJobStatus, Resource};
use async_trait::async_trait;
use peft_core::{CapabilityFlags, Config};
use std::collections::HashMap;
use tokio::sync::mpsc;

struct StubConnector {
    connected: parking_lot::Mutex<bool>,
}

impl StubConnector {
    fn new() -> Self {
        Self { connected: parking_lot::Mutex::new(false) }
    }
}

#[async_trait]
impl Connector for StubConnector {
    fn name(&self) -> &str {
        "stub"
    }
    fn display_name(&self) -> &str {
        "Stub"
    }
    fn version(&self) -> &str {
        "0.1.0"
    }
    async fn connect(&self, _credentials: &HashMap<String, String>) -> Result<(), CoreError> {
        *self.connected.lock() = true;
        Ok(())
    }
    async fn disconnect(&self) -> Result<(), CoreError> {
        *self.connected.lock() = false;
        Ok(())
    }
    async fn verify(&self) -> Result<bool, CoreError> {
        Ok(*self.connected.lock())
    }
    async fn submit_job(&self, _config: &Config) -> Result<String, CoreError> {
        Ok("job-1".into())
    }
    async fn get_job_status(&self, _provider_job_id: &str) -> Result<ProviderJobStatus, CoreError> {
        Ok(ProviderJobStatus::Running)
    }
    async fn cancel_job(&self, _provider_job_id: &str) -> Result<(), CoreError> {
        Ok(())
    }
    async fn stream_logs(&self, _provider_job_id: &str) -> Result<mpsc::Receiver<String>, CoreError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }
    async fn fetch_artifact(&self, _provider_job_id: &str) -> Result<Vec<u8>, CoreError> {
        Ok(vec![])
    }
    async fn list_resources(&self) -> Result<Vec<Resource>, CoreError> {
        Ok(vec![])
    }
    async fn get_pricing(&self, _resource_id: &str) -> Result<PricingInfo, CoreError> {
        Ok(PricingInfo { price_per_hour: 1.0, billing_increment_seconds: 60, minimum_charge_seconds: 60, spot_available: false, spot_price_per_hour: None })
    }
}

fn record(required: Vec<&str>) -> ConnectorRecord {
    ConnectorRecord::builder()
        .name("stub")
        .capability_flags(CapabilityFlags { training: true, ..Default::default() })
        .required_credential_keys(required.into_iter().map(String::from).collect())
        .build()
}

#[tokio::test]
async fn connect_rejects_missing_credentials() {
    let manager = ConnectorManager::new();
    manager.registry().register(record(vec!["api_token"]), Arc::new(|| Arc::new(StubConnector::new()) as Arc<dyn Connector>), false).unwrap();

    let err = manager.connect("stub", HashMap::new()).await.unwrap_err();
    assert_eq!(err.kind, peft_core::ErrorKind::Validation);
}

#[tokio::test]
async fn connect_caches_instance_and_credentials() {
    let manager = ConnectorManager::new();
    manager.registry().register(record(vec!["api_token"]), Arc::new(|| Arc::new(StubConnector::new()) as Arc<dyn Connector>), false).unwrap();

    let mut creds = HashMap::new();
    creds.insert("api_token".to_string(), "secret".to_string());
    manager.connect("stub", creds).await.unwrap();

    assert!(manager.is_connected("stub"));
    assert_eq!(manager.list_connected(), vec!["stub".to_string()]);
}

#[tokio::test]
async fn disconnect_on_unknown_connector_is_a_noop() {
    let manager = ConnectorManager::new();
    manager.disconnect("nope").await.unwrap();
}

#[tokio::test]
async fn connect_on_unknown_name_is_not_found() {
    let manager = ConnectorManager::new();
    let err = manager.connect("nope", HashMap::new()).await.unwrap_err();
    assert_eq!(err.kind, peft_core::ErrorKind::NotFound);
}

#[test]
fn discover_registers_valid_manifests_and_collects_failures() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("stub.json"),
        r#"{"record": {"name": "stub", "display_name": "Stub", "version": "1.0.0", "capability_flags": {"training": true, "inference": false, "registry": false, "tracking": false}, "required_credential_keys": [], "enabled": true}, "factory_key": "stub"}"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("broken.json"), "not json").unwrap();
    std::fs::write(dir.path().join("ignored.txt"), "irrelevant").unwrap();

    let manager = ConnectorManager::new();
    let mut factories: HashMap<String, Factory> = HashMap::new();
    factories.insert("stub".to_string(), Arc::new(|| Arc::new(StubConnector::new()) as Arc<dyn Connector>));

    let (registered, failures) = manager.discover(dir.path(), &factories);
    assert_eq!(registered, vec!["stub".to_string()]);
    assert_eq!(failures.len(), 1);
    assert!(failures[0].path.ends_with("broken.json"));
}
