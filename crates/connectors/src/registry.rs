// SPDX-License-Identifier: MIT

//! Connector registry: metadata catalog, validation, capability queries
//! (§4.A). Grounded on
//! `original_source/backend/connectors/registry.py::ConnectorRegistry`.

use crate::connector::Connector;
use indexmap::IndexMap;
use parking_lot::RwLock;
use peft_core::{CapabilityFlags, ConnectorRecord, CoreError, CoreResult};
use std::sync::Arc;

type Factory = Arc<dyn Fn() -> Arc<dyn Connector> + Send + Sync>;

struct Entry {
    record: ConnectorRecord,
    factory: Factory,
}

/// Catalog of registered connector plugins, keyed by name (§3:
/// "Connector Record... name is the primary key").
///
/// A Rust `Connector` implementation can't be "missing a method" the way
/// a Python subclass can skip an abstract override — the trait bound
/// enforces that at compile time. So registration here validates only
/// the metadata half of §4.A's contract ([`ConnectorRecord::validate`]);
/// the "required operations implemented" half is the type system's job.
#[derive(Default)]
pub struct ConnectorRegistry {
    entries: RwLock<IndexMap<String, Entry>>,
    validation_errors: RwLock<IndexMap<String, String>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector. Refuses a duplicate name unless `replace` is
    /// set, in which case a warning is logged (§4.A).
    pub fn register(&self, record: ConnectorRecord, factory: Factory, replace: bool) -> CoreResult<()> {
        if let Err(err) = record.validate() {
            self.validation_errors.write().insert(record.name.clone(), err.message.clone());
            return Err(err);
        }

        let mut entries = self.entries.write();
        if entries.contains_key(&record.name) && !replace {
            return Err(CoreError::validation(format!(
                "connector '{}' is already registered",
                record.name
            )));
        }
        if entries.contains_key(&record.name) {
            tracing::warn!(connector = %record.name, "replacing already-registered connector");
        }
        let name = record.name.clone();
        entries.insert(name, Entry { record, factory });
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.entries.write().shift_remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<ConnectorRecord> {
        self.entries.read().get(name).map(|e| e.record.clone())
    }

    pub fn instantiate(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.entries.read().get(name).map(|e| (e.factory)())
    }

    pub fn list_all(&self) -> Vec<ConnectorRecord> {
        self.entries.read().values().map(|e| e.record.clone()).collect()
    }

    pub fn list_enabled(&self) -> Vec<ConnectorRecord> {
        self.entries.read().values().filter(|e| e.record.enabled).map(|e| e.record.clone()).collect()
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.entries.write().get_mut(name) {
            Some(entry) => {
                entry.record.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn validation_error(&self, name: &str) -> Option<String> {
        self.validation_errors.read().get(name).cloned()
    }

    /// Enabled connectors with `flag` set, used by dispatchers for
    /// auto-selection (§4.A feature query).
    pub fn list_by_capability(&self, flag: impl Fn(CapabilityFlags) -> bool) -> Vec<ConnectorRecord> {
        self.entries
            .read()
            .values()
            .filter(|e| e.record.enabled && flag(e.record.capability_flags))
            .map(|e| e.record.clone())
            .collect()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
