//! # Write-Ahead Log
//!
//! Every mutation is appended to the WAL, and fsynced, before it touches the
//! in-memory state. The log is line-delimited JSON:
//!
//! ```text
//! {"seq":1,"operation":"create","collection":"todos","id":"…","payload":{…full record…}}
//! {"seq":2,"operation":"mark_done","collection":"todos","id":"…","payload":{"updated_at":"2030-01-01T10:00:00Z"}}
//! {"seq":3,"operation":"delete","collection":"notes","id":"…","payload":null}
//! ```
//!
//! - `create`/`update` carry the record as it exists after the mutation.
//! - `mark_done` carries the new `updated_at`.
//! - `delete` carries nothing.
//!
//! ## Torn writes
//!
//! An entry is committed once its terminating newline is on disk. Bytes after
//! the last newline are the signature of a crash mid-append: the reader
//! ignores them, and [`WalWriter::resume`] cuts them off before appending.
//! A malformed line in the middle of the log is skipped with a warning.
//!
//! ## Truncation
//!
//! After a successful snapshot the log is replaced by an empty file through the
//! same temp-file-and-rename path the snapshot uses, and `seq` restarts at 1.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use super::snapshot::stage_bytes;
use super::state::StoreState;
use crate::error::{Result, StoreError};
use crate::model::{timestamp, Collection, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
    MarkDone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Assigned by the writer on append. Starts at 1.
    pub seq: u64,
    pub operation: Operation,
    pub collection: Collection,
    pub id: Uuid,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct MarkDonePayload {
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl WalEntry {
    fn new(operation: Operation, collection: Collection, id: Uuid, payload: serde_json::Value) -> Self {
        Self {
            seq: 0,
            operation,
            collection,
            id,
            payload,
        }
    }

    pub fn create<R: Record>(record: &R) -> Result<Self> {
        Ok(Self::new(
            Operation::Create,
            R::COLLECTION,
            record.id(),
            serde_json::to_value(record)?,
        ))
    }

    pub fn update<R: Record>(record: &R) -> Result<Self> {
        Ok(Self::new(
            Operation::Update,
            R::COLLECTION,
            record.id(),
            serde_json::to_value(record)?,
        ))
    }

    pub fn delete<R: Record>(id: Uuid) -> Self {
        Self::new(Operation::Delete, R::COLLECTION, id, serde_json::Value::Null)
    }

    pub fn mark_done(id: Uuid, updated_at: DateTime<Utc>) -> Self {
        let payload = serde_json::json!({
            "updated_at": updated_at.format(timestamp::FORMAT).to_string(),
        });
        Self::new(Operation::MarkDone, Collection::Todos, id, payload)
    }
}

/// Counters from one replay pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: usize,
    pub skipped: usize,
}

/// The parsed contents of a WAL file.
#[derive(Debug, Default)]
pub struct WalLog {
    /// Valid entries with their 1-based line numbers, in file order.
    pub entries: Vec<(usize, WalEntry)>,
    /// Lines that failed to parse.
    pub corrupt: Vec<StoreError>,
    /// The file ended with an unterminated line.
    pub torn_tail: bool,
    /// Length of the file up to and including the last newline.
    pub committed_len: u64,
    /// Total length of the file on disk.
    pub file_len: u64,
}

impl WalLog {
    /// Reads and parses the whole log. A missing file is an empty log; any
    /// other I/O failure is returned.
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };

        let committed = bytes
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|i| i + 1)
            .unwrap_or(0);

        let mut log = WalLog {
            committed_len: committed as u64,
            file_len: bytes.len() as u64,
            torn_tail: committed < bytes.len(),
            ..Default::default()
        };

        if log.torn_tail {
            warn!(
                path = %path.display(),
                bytes = bytes.len() - committed,
                "WAL ends with a torn write, ignoring it"
            );
        }

        for (idx, line) in bytes[..committed].split(|&b| b == b'\n').enumerate() {
            let line_no = idx + 1;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<WalEntry>(line) {
                Ok(entry) => log.entries.push((line_no, entry)),
                Err(e) => {
                    warn!(line = line_no, error = %e, "Skipping malformed WAL entry");
                    log.corrupt.push(StoreError::WalEntryCorrupt {
                        line: line_no,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(log)
    }

    pub fn is_empty(&self) -> bool {
        self.file_len == 0
    }

    pub fn last_seq(&self) -> u64 {
        self.entries.iter().map(|(_, e)| e.seq).max().unwrap_or(0)
    }

    /// Applies every entry, in order, onto `state`.
    ///
    /// Entries whose `seq` does not advance past the previous one are treated
    /// as duplicates. Entries that fail to apply are logged and skipped.
    pub fn replay_onto(&self, state: &mut StoreState) -> ReplayStats {
        let mut stats = ReplayStats {
            skipped: self.corrupt.len(),
            ..Default::default()
        };
        let mut last_seq = 0;

        for (line, entry) in &self.entries {
            if entry.seq <= last_seq {
                warn!(line, seq = entry.seq, last_seq, "Skipping out-of-order WAL entry");
                stats.skipped += 1;
                continue;
            }
            last_seq = entry.seq;

            match state.apply(entry) {
                Ok(()) => stats.applied += 1,
                Err(e) => {
                    warn!(
                        line,
                        seq = entry.seq,
                        operation = ?entry.operation,
                        collection = %entry.collection,
                        id = %entry.id,
                        error = %e,
                        "Skipping WAL entry that could not be applied"
                    );
                    stats.skipped += 1;
                }
            }
        }

        stats
    }
}

/// Appends entries to the WAL file.
pub struct WalWriter {
    path: PathBuf,
    file: File,
    next_seq: u64,
    /// Entries appended since the last truncation.
    pending: u64,
    /// Bytes in the file, all newline-terminated.
    len: u64,
}

impl WalWriter {
    pub fn open(path: &Path) -> Result<Self> {
        let log = WalLog::read(path)?;
        Self::resume(path, &log)
    }

    /// Opens the log for appending after it has already been read, cutting off
    /// any torn tail first.
    pub fn resume(path: &Path, log: &WalLog) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if log.torn_tail {
            file.set_len(log.committed_len)?;
            file.sync_all()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_seq: log.last_seq() + 1,
            pending: log.entries.len() as u64,
            len: log.committed_len,
        })
    }

    /// Appends one entry and syncs it to disk. Assigns and returns its `seq`.
    ///
    /// On failure the file is cut back to its previous length so a partial
    /// line never precedes the next append.
    pub fn append(&mut self, entry: &mut WalEntry) -> Result<u64> {
        entry.seq = self.next_seq;
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let written = self
            .file
            .write_all(&line)
            .and_then(|()| self.file.sync_data());
        if let Err(e) = written {
            if let Err(rollback) = self.file.set_len(self.len) {
                warn!(error = %rollback, "Could not roll back partial WAL append");
            }
            return Err(e.into());
        }

        self.len += line.len() as u64;
        self.next_seq += 1;
        self.pending += 1;
        debug!(
            seq = entry.seq,
            operation = ?entry.operation,
            collection = %entry.collection,
            id = %entry.id,
            "WAL append"
        );
        Ok(entry.seq)
    }

    /// Atomically replaces the log with an empty file.
    ///
    /// The replacement is opened before it is renamed into place, so on any
    /// failure the writer still appends to the file at `path`.
    pub fn truncate(&mut self) -> Result<()> {
        let staged = stage_bytes(&self.path, b"")?;
        let file = OpenOptions::new().append(true).open(staged.tmp_path())?;
        staged.commit()?;
        self.file = file;
        self.next_seq = 1;
        self.pending = 0;
        self.len = 0;
        Ok(())
    }

    /// Entries appended since the last truncation.
    pub fn pending(&self) -> u64 {
        self.pending
    }
}
