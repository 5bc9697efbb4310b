// SPDX-License-Identifier: MIT

//! Daemon startup configuration, loaded from the environment (§6
//! Configuration): `DATABASE_URL` (here, the path to the WAL this kernel
//! uses in place of a SQL engine — see `peft_storage::WalDurableStore`),
//! checkpoint/artifact roots, connector plugin directory. Mirrors the
//! teacher's `oj-daemon` env-driven startup, including its use of `dirs`
//! for platform default paths.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub wal_path: PathBuf,
    pub checkpoint_root: PathBuf,
    pub artifact_root: PathBuf,
    pub connector_plugin_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Default argv for the production `ProcessTrainingDriver` when a job's
    /// `Config.vars["training_command"]` is unset.
    pub default_training_command: Vec<String>,
    /// Base URL for the built-in "http" connector (§4.A). Overridable so
    /// deployments can point it at their actual provider endpoint instead
    /// of the placeholder used when nothing is configured.
    pub http_connector_base_url: String,
}

fn state_dir() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(std::env::temp_dir).join("peft")
}

fn env_path(key: &str, default: impl Fn() -> PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or_else(|_| default())
}

impl DaemonConfig {
    /// Load from the environment, falling back to platform state-dir
    /// defaults for anything unset (§6).
    pub fn from_env() -> Self {
        let base = state_dir();
        Self {
            socket_path: env_path("PEFT_SOCKET_PATH", || base.join("peftd.sock")),
            wal_path: env_path("DATABASE_URL", || base.join("jobs.wal")),
            checkpoint_root: env_path("PEFT_CHECKPOINT_ROOT", || base.join("checkpoints")),
            artifact_root: env_path("PEFT_ARTIFACT_ROOT", || base.join("artifacts")),
            connector_plugin_dir: env_path("PEFT_CONNECTOR_PLUGIN_DIR", || base.join("connectors")),
            log_dir: env_path("PEFT_LOG_DIR", || base.join("logs")),
            default_training_command: std::env::var("PEFT_TRAINING_COMMAND")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_else(|_| vec!["peft-train".to_string()]),
            http_connector_base_url: std::env::var("PEFT_HTTP_BASE_URL")
                .unwrap_or_else(|_| "https://example.invalid".to_string()),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
