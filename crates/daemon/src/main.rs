// SPDX-License-Identifier: MIT

//! `peftd`: the control-plane daemon driving the §6 façade behind a Unix
//! domain socket. Grounded on the teacher's `oj-daemon` binary: load
//! config from the environment, replay durable state, bind the socket
//! last (only once every fallible step has succeeded), run the accept
//! loop until `SIGINT`/`SIGTERM`.

mod config;
mod server;

use config::DaemonConfig;
use peft_connectors::{
    ConnectorManager, DesktopNotifyAdapter, HttpConnector, KubernetesConfig, KubernetesConnector,
    ProcessTrainingDriver,
};
use peft_core::{CapabilityFlags, ConnectorRecord, SystemClock};
use peft_engine::Orchestrator;
use peft_storage::WalDurableStore;
use server::DaemonCtx;
use std::sync::Arc;
use tokio::net::UnixListener;
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &DaemonConfig) -> tracing_appender::non_blocking::WorkerGuard {
    std::fs::create_dir_all(&config.log_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "peftd.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    guard
}

/// Register the two built-in connectors every daemon ships with. Neither
/// is connected until a client sends `ConnectorConnect`; registration
/// only publishes the metadata and factory (§4.A).
fn register_builtin_connectors(registry: &peft_connectors::ConnectorRegistry, http_base_url: &str) {
    let http_record = ConnectorRecord {
        name: "http".to_string(),
        display_name: "Generic HTTP provider".to_string(),
        version: "0.1.0".to_string(),
        capability_flags: CapabilityFlags { training: true, inference: false, registry: false, tracking: false },
        required_credential_keys: vec!["api_token".to_string()],
        enabled: true,
    };
    let base_url = http_base_url.to_string();
    if let Err(e) = registry.register(
        http_record,
        Arc::new(move || Arc::new(HttpConnector::new("http", "Generic HTTP provider", base_url.clone())) as Arc<dyn peft_connectors::Connector>),
        false,
    ) {
        tracing::error!(error = %e, "failed to register built-in http connector");
    }

    let k8s_record = ConnectorRecord {
        name: "kubernetes".to_string(),
        display_name: "Kubernetes Job provider".to_string(),
        version: "0.1.0".to_string(),
        capability_flags: CapabilityFlags { training: true, inference: false, registry: false, tracking: false },
        required_credential_keys: vec!["kubeconfig".to_string(), "namespace".to_string()],
        enabled: true,
    };
    if let Err(e) = registry.register(
        k8s_record,
        Arc::new(|| Arc::new(KubernetesConnector::new(KubernetesConfig::default())) as Arc<dyn peft_connectors::Connector>),
        false,
    ) {
        tracing::error!(error = %e, "failed to register built-in kubernetes connector");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DaemonConfig::from_env();
    let _tracing_guard = init_tracing(&config);
    tracing::info!(socket = ?config.socket_path, "starting peftd");

    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.checkpoint_root)?;
    std::fs::create_dir_all(&config.artifact_root)?;
    std::fs::create_dir_all(&config.connector_plugin_dir)?;

    let store = Arc::new(WalDurableStore::open(&config.wal_path)?);

    let connectors = Arc::new(ConnectorManager::new());
    register_builtin_connectors(connectors.registry(), &config.http_connector_base_url);

    let mut factories: std::collections::HashMap<String, Arc<dyn Fn() -> Arc<dyn peft_connectors::Connector> + Send + Sync>> =
        std::collections::HashMap::new();
    let http_base_url = config.http_connector_base_url.clone();
    factories.insert(
        "http".to_string(),
        Arc::new(move || Arc::new(HttpConnector::new("http", "Generic HTTP provider", http_base_url.clone())) as Arc<dyn peft_connectors::Connector>),
    );
    factories.insert(
        "kubernetes".to_string(),
        Arc::new(|| Arc::new(KubernetesConnector::new(KubernetesConfig::default())) as Arc<dyn peft_connectors::Connector>),
    );
    let (discovered, failures) = connectors.discover(&config.connector_plugin_dir, &factories);
    if !discovered.is_empty() {
        tracing::info!(connectors = ?discovered, "discovered plugin connectors");
    }
    for failure in failures {
        tracing::warn!(path = ?failure.path, error = %failure.error, "connector plugin discovery failed");
    }

    let orchestrator = Arc::new(Orchestrator::new(
        SystemClock,
        connectors.clone(),
        config.checkpoint_root.clone(),
        config.artifact_root.clone(),
        Arc::new(DesktopNotifyAdapter::new()),
        Arc::new(DesktopNotifyAdapter::new()),
        store,
        ProcessTrainingDriver::new(config.default_training_command.clone()),
    ));

    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)?;
    tracing::info!(socket = ?config.socket_path, "listening");

    let ctx = DaemonCtx { orchestrator, connectors };
    let accept_task = tokio::spawn(server::accept_loop(listener, ctx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("received shutdown signal");
    accept_task.abort();
    let _ = std::fs::remove_file(&config.socket_path);
    Ok(())
}
