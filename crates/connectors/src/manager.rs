// SPDX-License-Identifier: MIT

//! Connector lifecycle manager: connect/disconnect, credential binding,
//! connected-instance cache (§4.A). Grounded on
//! `original_source/backend/connectors/manager.py::ConnectorManager`
//! (the canonical manager per the spec's explicit instruction — a second,
//! divergent `connector_manager.py` also exists upstream and is not used).

use crate::connector::Connector;
use crate::registry::ConnectorRegistry;
use parking_lot::RwLock;
use peft_core::{ConnectorRecord, CoreError, CoreResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type Factory = Arc<dyn Fn() -> Arc<dyn Connector> + Send + Sync>;

/// A directory-discovered connector descriptor (§4.A discovery). This
/// binary ships its connectors compiled in rather than dynamically
/// loaded (no dynamic-library-loading crate in the stack, and the spec's
/// Non-goals exclude implementing arbitrary cloud wire formats), so a
/// manifest file declares a [`ConnectorRecord`] plus which compiled-in
/// factory to bind it to, rather than a path to a loadable object.
#[derive(Debug, Deserialize)]
struct ConnectorManifest {
    record: ConnectorRecord,
    factory_key: String,
}

/// One manifest file's outcome, reported back to the caller so a single
/// bad file never silently swallows the rest of the directory (§4.A:
/// "load failure of one plugin never prevents loading of others").
#[derive(Debug)]
pub struct DiscoveryFailure {
    pub path: PathBuf,
    pub error: CoreError,
}

/// Owns the [`ConnectorRegistry`] plus the live, connected instances and
/// their credentials. Credentials are held only in memory — never logged,
/// never serialized to audit output (§4.A).
pub struct ConnectorManager {
    registry: ConnectorRegistry,
    instances: RwLock<HashMap<String, Arc<dyn Connector>>>,
    credentials: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl Default for ConnectorManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectorManager {
    pub fn new() -> Self {
        Self { registry: ConnectorRegistry::new(), instances: RwLock::new(HashMap::new()), credentials: RwLock::new(HashMap::new()) }
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    /// Scan `plugin_dir` for `*.json` connector manifests and register
    /// each against the compiled-in `factories` map (§4.A discovery).
    /// Every file is attempted independently: a parse error, a missing
    /// factory key, or a registration-validation failure in one file is
    /// collected and returned, never aborting the scan of the rest of the
    /// directory. Returns the names successfully registered.
    pub fn discover(&self, plugin_dir: &Path, factories: &HashMap<String, Factory>) -> (Vec<String>, Vec<DiscoveryFailure>) {
        let mut registered = Vec::new();
        let mut failures = Vec::new();

        let entries = match std::fs::read_dir(plugin_dir) {
            Ok(entries) => entries,
            Err(e) => {
                failures.push(DiscoveryFailure {
                    path: plugin_dir.to_path_buf(),
                    error: CoreError::not_found(format!("plugin directory unreadable: {e}")),
                });
                return (registered, failures);
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.load_manifest(&path, factories) {
                Ok(name) => registered.push(name),
                Err(error) => failures.push(DiscoveryFailure { path, error }),
            }
        }

        (registered, failures)
    }

    fn load_manifest(&self, path: &Path, factories: &HashMap<String, Factory>) -> CoreResult<String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CoreError::not_found(format!("cannot read {}: {e}", path.display())))?;
        let manifest: ConnectorManifest = serde_json::from_str(&contents)
            .map_err(|e| CoreError::validation(format!("malformed manifest {}: {e}", path.display())))?;
        let factory = factories
            .get(&manifest.factory_key)
            .ok_or_else(|| CoreError::not_found(format!("unknown factory_key '{}'", manifest.factory_key)))?
            .clone();
        let name = manifest.record.name.clone();
        self.registry.register(manifest.record, factory, false)?;
        Ok(name)
    }

    /// Look up the metadata, verify every required credential key is
    /// present, instantiate the connector if not cached, and invoke its
    /// `connect`. On success the credentials are cached in memory (§4.A).
    pub async fn connect(&self, name: &str, credentials: HashMap<String, String>) -> CoreResult<()> {
        let record = self.registry.get(name).ok_or_else(|| CoreError::not_found(format!("connector '{name}' not found")))?;

        if !record.enabled {
            return Err(CoreError::illegal_state(format!("connector '{name}' is disabled")));
        }

        for key in &record.required_credential_keys {
            if !credentials.contains_key(key) {
                return Err(CoreError::validation(format!("missing required credential: {key}")));
            }
        }

        let connector = {
            let existing = self.instances.read().get(name).cloned();
            match existing {
                Some(connector) => connector,
                None => {
                    let connector = self
                        .registry
                        .instantiate(name)
                        .ok_or_else(|| CoreError::not_found(format!("connector '{name}' has no factory")))?;
                    self.instances.write().insert(name.to_string(), connector.clone());
                    connector
                }
            }
        };

        connector.connect(&credentials).await?;
        self.credentials.write().insert(name.to_string(), credentials);
        Ok(())
    }

    /// Release both the live instance and its cached credentials.
    pub async fn disconnect(&self, name: &str) -> CoreResult<()> {
        let connector = self.instances.read().get(name).cloned();
        let Some(connector) = connector else {
            return Ok(());
        };
        connector.disconnect().await?;
        self.instances.write().remove(name);
        self.credentials.write().remove(name);
        Ok(())
    }

    pub fn get_connector(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.instances.read().get(name).cloned()
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.instances.read().contains_key(name)
    }

    pub fn list_connected(&self) -> Vec<String> {
        self.instances.read().keys().cloned().collect()
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
