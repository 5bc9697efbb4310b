// SPDX-License-Identifier: MIT

//! Durable, directory-based checkpoint persistence (§4.D). Grounded on the
//! teacher's `oj-storage` WAL file discipline (open-append-flush, blob
//! written before metadata so a crash mid-write never leaves a directory
//! that looks complete).

use peft_core::{sha256_hex, Checkpoint, CheckpointHandle, CoreError, CoreResult, JobId};
use std::path::{Path, PathBuf};

/// Persists checkpoints under `<root>/<job_id>/checkpoint-<step>/` and
/// enforces `save_total_limit` retention.
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.root.join(job_id.as_str())
    }

    fn checkpoint_dir(&self, job_id: &JobId, step: u64) -> PathBuf {
        self.job_dir(job_id).join(format!("checkpoint-{step}"))
    }

    /// Serialize and persist `checkpoint` for `job_id`, writing the blob
    /// first and `metadata.json` last so a reader can trust that any
    /// directory containing metadata is complete (§4.D). Writes to a
    /// temporary sibling directory and renames into place so a crash
    /// mid-write never leaves a partial `checkpoint-<step>/` behind.
    pub fn save(&self, job_id: &JobId, checkpoint: &Checkpoint) -> CoreResult<CheckpointHandle> {
        let final_dir = self.checkpoint_dir(job_id, checkpoint.step);
        let tmp_dir = self.job_dir(job_id).join(format!(".tmp-checkpoint-{step}-{pid}", step = checkpoint.step, pid = std::process::id()));

        std::fs::create_dir_all(&tmp_dir).map_err(io_err)?;

        let blob = serialize_blob(checkpoint)?;
        let sha256 = sha256_hex(&blob);
        std::fs::write(tmp_dir.join("blob.bin"), &blob).map_err(io_err)?;

        let metadata = CheckpointMetadata {
            step: checkpoint.step,
            epoch: checkpoint.epoch,
            loss: checkpoint.loss,
            reason: checkpoint.reason,
            timestamp_ms: checkpoint.timestamp_ms,
            sha256: sha256.clone(),
        };
        let metadata_json = serde_json::to_vec_pretty(&metadata).map_err(|e| CoreError::validation(format!("checkpoint metadata encode failed: {e}")))?;
        std::fs::write(tmp_dir.join("metadata.json"), metadata_json).map_err(io_err)?;

        if final_dir.exists() {
            std::fs::remove_dir_all(&final_dir).map_err(io_err)?;
        }
        std::fs::rename(&tmp_dir, &final_dir).map_err(io_err)?;

        let path = final_dir.to_string_lossy().into_owned();
        let handle = CheckpointHandle::new(checkpoint, path, sha256);

        self.enforce_retention(job_id, checkpoint.config_snapshot.save_total_limit as usize)?;

        Ok(handle)
    }

    /// Load the full checkpoint back from `handle.path`, verifying the
    /// blob's hash still matches `handle.sha256` (§4.D integrity check).
    pub fn load(&self, handle: &CheckpointHandle) -> CoreResult<Checkpoint> {
        let dir = Path::new(&handle.path);
        let blob = std::fs::read(dir.join("blob.bin")).map_err(io_err)?;
        let actual = sha256_hex(&blob);
        if actual != handle.sha256 {
            return Err(CoreError::integrity(format!(
                "checkpoint at {} failed integrity check: expected {}, got {actual}",
                handle.path, handle.sha256
            )));
        }
        deserialize_blob(&blob)
    }

    /// Return every checkpoint step persisted for `job_id`, ascending.
    pub fn list_steps(&self, job_id: &JobId) -> CoreResult<Vec<u64>> {
        let dir = self.job_dir(job_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut steps: Vec<u64> = std::fs::read_dir(&dir)
            .map_err(io_err)?
            .flatten()
            .filter_map(|entry| entry.file_name().to_str().and_then(|name| name.strip_prefix("checkpoint-")).and_then(|s| s.parse().ok()))
            .collect();
        steps.sort_unstable();
        Ok(steps)
    }

    /// Enforce `save_total_limit`: delete the oldest checkpoints for
    /// `job_id` until at most `limit` remain (§4.D retention GC).
    pub fn enforce_retention(&self, job_id: &JobId, limit: usize) -> CoreResult<Vec<u64>> {
        let steps = self.list_steps(job_id)?;
        if steps.len() <= limit {
            return Ok(Vec::new());
        }
        let evict_count = steps.len() - limit;
        let evicted: Vec<u64> = steps.into_iter().take(evict_count).collect();
        for step in &evicted {
            let dir = self.checkpoint_dir(job_id, *step);
            std::fs::remove_dir_all(&dir).map_err(io_err)?;
        }
        Ok(evicted)
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct CheckpointMetadata {
    step: u64,
    epoch: f64,
    loss: f64,
    reason: peft_core::CheckpointReason,
    timestamp_ms: u64,
    sha256: String,
}

fn serialize_blob(checkpoint: &Checkpoint) -> CoreResult<Vec<u8>> {
    serde_json::to_vec(checkpoint).map_err(|e| CoreError::validation(format!("checkpoint encode failed: {e}")))
}

fn deserialize_blob(blob: &[u8]) -> CoreResult<Checkpoint> {
    serde_json::from_slice(blob).map_err(|e| CoreError::validation(format!("checkpoint decode failed: {e}")))
}

/// Map a checkpoint-store I/O failure to the §7 taxonomy: a missing
/// directory or file (an unwritten or already-GC'd checkpoint) is
/// `NotFound`, every other I/O failure is `Validation`.
fn io_err(e: std::io::Error) -> CoreError {
    if e.kind() == std::io::ErrorKind::NotFound {
        CoreError::not_found(format!("checkpoint not found: {e}"))
    } else {
        CoreError::validation(format!("checkpoint store I/O failure: {e}"))
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
