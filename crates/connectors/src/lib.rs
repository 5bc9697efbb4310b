// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! peft-connectors: the §4.A connector contract, registry, credential
//! manager, and the built-in connectors the control plane ships with.

pub mod connector;
pub mod http;
pub mod k8s;
pub mod local;
pub mod manager;
pub mod notify;
pub mod process;
pub mod registry;

pub use connector::{
    permanent, transient, Connector, ConnectorError, PricingInfo, ProviderJobStatus, Resource,
    ResourceKind,
};
pub use http::HttpConnector;
pub use k8s::{KubernetesConfig, KubernetesConnector};
#[cfg(any(test, feature = "test-support"))]
pub use local::FakeTrainingDriver;
pub use local::{LocalDriver, TrainingCommand, TrainingDriver, TrainingUpdate};
pub use manager::{ConnectorManager, DiscoveryFailure};
#[cfg(any(test, feature = "test-support"))]
pub use notify::FakeNotifyAdapter;
pub use notify::{DesktopNotifyAdapter, DndProvider, NotifyAdapter};
pub use process::ProcessTrainingDriver;
pub use registry::ConnectorRegistry;
