// SPDX-License-Identifier: MIT

//! Connector registration metadata (§3, §4.A). The connector trait itself,
//! the registry that holds these records, and the `factory` that
//! instantiates a connector from one live in `peft_connectors`; this is
//! the serializable record describing what was registered.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityFlags {
    pub training: bool,
    pub inference: bool,
    pub registry: bool,
    pub tracking: bool,
}

impl CapabilityFlags {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Metadata describing a registered connector plugin (§3). The `factory`
/// that builds a live connector instance from this record is not part of
/// the serializable shape; it is held alongside the record in
/// `peft_connectors::registry::ConnectorRegistry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorRecord {
    pub name: String,
    pub display_name: String,
    pub version: String,
    pub capability_flags: CapabilityFlags,
    pub required_credential_keys: Vec<String>,
    pub enabled: bool,
}

impl ConnectorRecord {
    /// The metadata-only half of the §4.A registration contract: name
    /// non-empty and at least one capability flag set. Confirming that the
    /// connector implementation actually provides every required
    /// operation is a trait-bound concern checked by the registry at
    /// registration time, not expressible on this plain struct.
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::validation("connector name must not be empty"));
        }
        let flags = self.capability_flags;
        if !(flags.training || flags.inference || flags.registry || flags.tracking) {
            return Err(CoreError::validation("connector must declare at least one capability flag"));
        }
        Ok(())
    }
}

crate::builder! {
    pub struct ConnectorRecordBuilder => ConnectorRecord {
        into {
            name: String = "local",
            display_name: String = "Local GPU",
            version: String = "0.1.0",
        }
        set {
            capability_flags: CapabilityFlags = CapabilityFlags { training: true, inference: false, registry: false, tracking: false },
            required_credential_keys: Vec<String> = Vec::new(),
            enabled: bool = true,
        }
    }
}

#[cfg(test)]
#[path = "connector_record_tests.rs"]
mod tests;
