// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! peft-storage: the durable event log, materialized job view, and
//! snapshotting that back the control plane's §4.H store.

pub mod durable_store;
pub mod snapshot;
pub mod state;
pub mod wal;

pub use durable_store::{DurableStore, WalDurableStore};
pub use snapshot::{load_snapshot, save_snapshot, Snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
pub use state::MaterializedState;
pub use wal::{Wal, WalEntry, WalError};
