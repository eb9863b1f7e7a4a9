//! Write-Ahead Log (WAL) for atomic batch writes.
//!
//! Every durable batch is appended as exactly one frame, so a batch is either
//! fully present in the log or absent. On reopen the log is replayed on top
//! of the last snapshot.
//!
//! # Format
//!
//! Each frame has the format:
//! ```text
//! [checksum:u32][length:u32][entry:json]
//! ```
//!
//! A trailing frame that is shorter than its header claims (or fails its
//! checksum while being the last frame) was never committed and is dropped.
//! A bad checksum anywhere before the tail is corruption.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::vector::VectorRecord;

const HEADER_LEN: usize = 8;

/// Sync mode for WAL writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Sync after every batch (safest, slowest).
    #[default]
    Immediate,
    /// Sync after a number of batches.
    Batched,
    /// Don't sync (fastest, risk of data loss on crash).
    NoSync,
}

/// One committed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum WalEntry {
    /// Insert or replace records.
    Put { records: Vec<VectorRecord> },
    /// Delete records by id.
    Delete { ids: Vec<String> },
    /// Delete every record.
    Clear,
}

impl WalEntry {
    /// Serializes the entry into a complete frame.
    fn to_frame(&self) -> Result<Vec<u8>> {
        let data = serde_json::to_vec(self)?;
        let mut frame = Vec::with_capacity(HEADER_LEN + data.len());
        frame.extend_from_slice(&crc32fast::hash(&data).to_le_bytes());
        frame.extend_from_slice(&(data.len() as u32).to_le_bytes());
        frame.extend_from_slice(&data);
        Ok(frame)
    }
}

/// Result of scanning a log file.
#[derive(Debug, Default)]
pub struct Replay {
    /// Committed entries, oldest first.
    pub entries: Vec<WalEntry>,
    /// Byte length of the committed prefix.
    pub committed_len: u64,
    /// True if an uncommitted tail was found after the committed prefix.
    pub torn_tail: bool,
}

/// Write-Ahead Log for durable batches.
#[derive(Debug)]
pub struct Wal {
    /// Path to the WAL file.
    path: PathBuf,
    /// File handle, opened for append.
    file: File,
    /// Sync mode.
    sync_mode: SyncMode,
    /// Frames written since last sync.
    frames_since_sync: usize,
    /// Frames between syncs in batched mode.
    batch_size: usize,
    /// Length of the log up to the last committed frame.
    committed_len: u64,
    /// Frames committed since the log was last truncated.
    frames: usize,
}

impl Wal {
    /// Opens or creates a WAL file, dropping any uncommitted tail.
    ///
    /// Returns the log and the committed entries it already holds.
    pub fn open<P: AsRef<Path>>(path: P, sync_mode: SyncMode) -> Result<(Self, Vec<WalEntry>)> {
        let path = path.as_ref().to_path_buf();
        let replay = Self::read_all(&path)?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        if replay.torn_tail {
            file.set_len(replay.committed_len)?;
            file.sync_all()?;
        }

        let wal = Self {
            path,
            file,
            sync_mode,
            frames_since_sync: 0,
            batch_size: 100,
            committed_len: replay.committed_len,
            frames: replay.entries.len(),
        };
        Ok((wal, replay.entries))
    }

    /// Appends one batch as a single frame.
    ///
    /// On failure the file is cut back to the last committed frame, so a
    /// failed batch never becomes visible to replay.
    pub fn append(&mut self, entry: &WalEntry) -> Result<()> {
        let frame = entry.to_frame()?;

        if let Err(e) = self.write_frame(&frame) {
            if let Err(rollback) = self.file.set_len(self.committed_len) {
                warn!(path = %self.path.display(), error = %rollback, "WAL rollback failed");
            }
            return Err(e);
        }

        self.committed_len += frame.len() as u64;
        self.frames += 1;
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.file.write_all(frame)?;
        self.frames_since_sync += 1;

        match self.sync_mode {
            SyncMode::Immediate => self.sync()?,
            SyncMode::Batched if self.frames_since_sync >= self.batch_size => self.sync()?,
            _ => {}
        }
        Ok(())
    }

    /// Forces a sync to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        self.frames_since_sync = 0;
        Ok(())
    }

    /// Empties the log. Call only after its contents are captured elsewhere.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.committed_len = 0;
        self.frames = 0;
        self.frames_since_sync = 0;
        Ok(())
    }

    /// Frames committed since the last truncation.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Bytes committed since the last truncation.
    pub fn committed_len(&self) -> u64 {
        self.committed_len
    }

    /// Returns the path to the WAL file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every committed entry of a log file.
    pub fn read_all<P: AsRef<Path>>(path: P) -> Result<Replay> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Replay::default());
        }

        let bytes = fs::read(path)?;
        let mut replay = Replay::default();
        let mut pos = 0usize;

        while pos < bytes.len() {
            let remaining = bytes.len() - pos;
            if remaining < HEADER_LEN {
                replay.torn_tail = true;
                break;
            }

            let expected = u32::from_le_bytes([
                bytes[pos],
                bytes[pos + 1],
                bytes[pos + 2],
                bytes[pos + 3],
            ]);
            let length = u32::from_le_bytes([
                bytes[pos + 4],
                bytes[pos + 5],
                bytes[pos + 6],
                bytes[pos + 7],
            ]) as usize;

            let end = pos + HEADER_LEN + length;
            if end > bytes.len() {
                replay.torn_tail = true;
                break;
            }

            let data = &bytes[pos + HEADER_LEN..end];
            let actual = crc32fast::hash(data);
            if actual != expected {
                if end == bytes.len() {
                    replay.torn_tail = true;
                    break;
                }
                return Err(Error::WalCorrupted(format!(
                    "checksum mismatch at offset {}: expected {}, got {}",
                    pos, expected, actual
                )));
            }

            let entry: WalEntry = serde_json::from_slice(data).map_err(|e| {
                Error::WalCorrupted(format!("undecodable frame at offset {}: {}", pos, e))
            })?;
            replay.entries.push(entry);
            pos = end;
        }

        replay.committed_len = pos as u64;
        if replay.torn_tail {
            warn!(
                path = %path.display(),
                committed = pos,
                discarded = bytes.len() - pos,
                "Ignoring uncommitted WAL tail"
            );
        }

        Ok(replay)
    }
}
