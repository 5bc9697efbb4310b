// SPDX-License-Identifier: MIT

//! Periodic, zstd-compressed snapshots of [`MaterializedState`] (§4.H).
//! Grounded on the teacher's `oj-daemon::storage::snapshot::Snapshot`
//! (same `version`/`seq`/`.bak` rotation scheme, via
//! [`crate::wal::rotate_bak_path`]) with two deliberate departures: this
//! kernel stamps `created_at_ms: u64` rather than `chrono::DateTime<Utc>`
//! to stay consistent with the rest of the kernel's clock handling, and
//! the serialized body is zstd-compressed before it hits disk.

use crate::state::MaterializedState;
use crate::wal::rotate_bak_path;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;
const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot from a future version {found}, this build understands up to {CURRENT_SNAPSHOT_VERSION}")]
    Migration { found: u32 },
}

/// A durable point-in-time copy of a [`MaterializedState`], tagged with
/// the WAL sequence it was taken at so the daemon knows which entries in
/// the WAL are still needed after loading it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub seq: u64,
    pub state: MaterializedState,
    pub created_at_ms: u64,
}

impl Snapshot {
    pub fn new(seq: u64, state: MaterializedState, created_at_ms: u64) -> Self {
        Self { version: CURRENT_SNAPSHOT_VERSION, seq, state, created_at_ms }
    }
}

/// Write `snapshot` to `path` as zstd-compressed JSON, rotating any
/// existing file at `path` into `.bak` / `.bak.N` first (mirrors
/// [`crate::wal::Wal::open`]'s corruption-recovery rotation, reused here
/// so a crash mid-write never destroys the last good snapshot).
pub fn save_snapshot(path: impl AsRef<Path>, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    let path = path.as_ref();
    let json = serde_json::to_vec(snapshot)?;
    let compressed = zstd::encode_all(json.as_slice(), ZSTD_LEVEL)?;

    if path.exists() {
        let bak = rotate_bak_path(path);
        fs::rename(path, bak)?;
    }

    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&compressed)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read back a snapshot written by [`save_snapshot`]. A version newer than
/// [`CURRENT_SNAPSHOT_VERSION`] is rejected rather than silently
/// misinterpreted.
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Snapshot, SnapshotError> {
    let mut compressed = Vec::new();
    File::open(path)?.read_to_end(&mut compressed)?;
    let json = zstd::decode_all(compressed.as_slice())?;
    let snapshot: Snapshot = serde_json::from_slice(&json)?;

    if snapshot.version > CURRENT_SNAPSHOT_VERSION {
        return Err(SnapshotError::Migration { found: snapshot.version });
    }
    Ok(snapshot)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
