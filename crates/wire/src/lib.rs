// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! peft-wire: the IPC protocol for the `peftctl`-to-`peftd` hop (§6).
//!
//! Wire format: 4-byte big-endian length prefix + JSON payload, exactly
//! as the teacher's `oj-wire` frames its daemon protocol.

mod request;
mod response;
mod types;
mod wire;

pub use request::Request;
pub use response::{Response, SuggestedActionDto};
pub use types::{ArtifactDto, CheckpointDto, HistoryFilter, JobDetail, JobSummary, RunStatsDto};
pub use wire::{decode, encode, read_message, read_request, write_message, write_response, ProtocolError};
