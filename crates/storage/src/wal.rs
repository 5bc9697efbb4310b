// SPDX-License-Identifier: MIT

//! Append-only event log (§3.1, §4.H). Grounded on the teacher's
//! `oj-storage::wal` contract (its `wal.rs` itself is absent from the
//! retrieval pack; this is rebuilt from `oj-storage/src/wal_tests.rs`'s
//! observable behavior) and `oj-daemon`'s `snapshot::rotate_bak_path`
//! backup-rotation scheme.

use peft_core::Event;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

const FLUSH_THRESHOLD: u64 = 100;
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const MAX_BAK_FILES: u32 = 3;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("wal I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wal serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One logged event, tagged with its monotonic sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub event: Event,
}

/// Append-only, JSON-lines event log with crash-corruption recovery.
///
/// `processed_seq` is the durable watermark a caller passes back to
/// [`Wal::open`] after restoring from a snapshot (not implemented by this
/// kernel — the materializer always replays from the start of the log).
/// `next_unprocessed` tracks its own read cursor, seeded from
/// `processed_seq` at open time, independent of when (or whether)
/// `mark_processed` is called.
pub struct Wal {
    path: PathBuf,
    writer: BufWriter<File>,
    write_seq: u64,
    processed_seq: u64,
    read_cursor: u64,
    unflushed: u64,
    last_flush: Instant,
}

impl Wal {
    pub fn open(path: impl AsRef<Path>, processed_seq: u64) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let (entries, corrupted) = scan_valid_entries(&path)?;

        if corrupted && path.exists() {
            let bak = rotate_bak_path(&path);
            std::fs::rename(&path, &bak)?;

            let mut clean = OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
            for entry in &entries {
                writeln!(clean, "{}", serde_json::to_string(entry)?)?;
            }
            clean.sync_all()?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let write_seq = entries.last().map(|e| e.seq).unwrap_or(0);

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            write_seq,
            processed_seq,
            read_cursor: processed_seq,
            unflushed: 0,
            last_flush: Instant::now(),
        })
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    pub fn append(&mut self, event: &Event) -> Result<u64, WalError> {
        self.write_seq += 1;
        let entry = WalEntry { seq: self.write_seq, event: event.clone() };
        writeln!(self.writer, "{}", serde_json::to_string(&entry)?)?;
        self.unflushed += 1;
        Ok(self.write_seq)
    }

    pub fn flush(&mut self) -> Result<(), WalError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.unflushed = 0;
        self.last_flush = Instant::now();
        Ok(())
    }

    pub fn needs_flush(&self) -> bool {
        self.unflushed >= FLUSH_THRESHOLD || (self.unflushed > 0 && self.last_flush.elapsed() >= FLUSH_INTERVAL)
    }

    /// Returns the next entry past the internal read cursor, advancing it.
    /// A corrupt or binary line is skipped rather than treated as fatal —
    /// entries appended after one (by the same live writer) remain
    /// reachable.
    pub fn next_unprocessed(&mut self) -> Result<Option<WalEntry>, WalError> {
        let (entries, _) = scan_valid_entries(&self.path)?;
        match entries.into_iter().find(|e| e.seq > self.read_cursor) {
            Some(entry) => {
                self.read_cursor = entry.seq;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    pub fn mark_processed(&mut self, seq: u64) {
        self.processed_seq = self.processed_seq.max(seq);
    }

    pub fn entries_after(&self, seq: u64) -> Result<Vec<WalEntry>, WalError> {
        let (entries, _) = scan_valid_entries(&self.path)?;
        Ok(entries.into_iter().filter(|e| e.seq > seq).collect())
    }

    /// Drop entries with `seq < seq`, compacting the on-disk log.
    pub fn truncate_before(&mut self, seq: u64) -> Result<(), WalError> {
        let (entries, _) = scan_valid_entries(&self.path)?;
        let retained: Vec<_> = entries.into_iter().filter(|e| e.seq >= seq).collect();

        let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&self.path)?;
        for entry in &retained {
            writeln!(file, "{}", serde_json::to_string(entry)?)?;
        }
        file.sync_all()?;
        drop(file);

        let reopened = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(reopened);
        self.unflushed = 0;
        self.last_flush = Instant::now();
        Ok(())
    }
}

/// Scan `path` line by line, parsing each as a JSON [`WalEntry`]. A line
/// that is not valid UTF-8 or not valid JSON is skipped (never fatal) and
/// reported back via the returned `bool`.
fn scan_valid_entries(path: &Path) -> Result<(Vec<WalEntry>, bool), WalError> {
    if !path.exists() {
        return Ok((Vec::new(), false));
    }

    let mut raw = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut raw)?;

    let mut entries = Vec::new();
    let mut corrupted = false;
    for line in raw.split(|&b| b == b'\n') {
        if line.is_empty() {
            continue;
        }
        match std::str::from_utf8(line).ok().and_then(|s| serde_json::from_str::<WalEntry>(s).ok()) {
            Some(entry) => entries.push(entry),
            None => corrupted = true,
        }
    }
    Ok((entries, corrupted))
}

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
/// Keeps up to [`MAX_BAK_FILES`] backups; the oldest is evicted.
pub(crate) fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| if n == 1 { path.with_extension("bak") } else { path.with_extension(format!("bak.{n}")) };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = std::fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = std::fs::rename(&src, bak(n + 1));
        }
    }
    bak(1)
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
