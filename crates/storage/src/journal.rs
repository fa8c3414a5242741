// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only journal of workflow records.
//!
//! One JSON entry per line, each carrying a monotonically increasing
//! sequence number and the full record as of that write. Crash recovery is
//! a replay: the last entry per workflow id wins. A corrupt tail is rotated
//! to a `.bak` file on open so the journal is always clean once opened.

use crate::snapshot::rotate_bak_path;
use cw_core::Workflow;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from journal operations
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One journal line: a sequence number and the record state at that write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub record: Workflow,
}

/// Append-only journal backed by a single file.
pub struct Journal {
    path: PathBuf,
    file: File,
    write_seq: u64,
}

impl Journal {
    /// Open (or create) the journal at `path`.
    ///
    /// Scans existing entries to recover the write sequence; `base_seq` (the
    /// snapshot's sequence) is the floor, so numbering never restarts below
    /// what a snapshot already covers. If the file has a corrupt tail, the
    /// original is rotated to a `.bak` and a clean file containing only the
    /// valid prefix is written in its place.
    pub fn open(path: &Path, base_seq: u64) -> Result<Self, JournalError> {
        let mut valid: Vec<String> = Vec::new();
        let mut write_seq = base_seq;
        let mut corrupt = false;

        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            for line in reader.split(b'\n') {
                let line = line?;
                if line.is_empty() {
                    continue;
                }
                let parsed = std::str::from_utf8(&line)
                    .ok()
                    .and_then(|s| serde_json::from_str::<JournalEntry>(s).ok());
                match parsed {
                    Some(entry) => {
                        write_seq = write_seq.max(entry.seq);
                        // Re-serialize so the clean file is canonical
                        valid.push(serde_json::to_string(&entry)?);
                    }
                    None => {
                        corrupt = true;
                        break;
                    }
                }
            }
        }

        if corrupt {
            let bak = rotate_bak_path(path);
            tracing::warn!(path = %path.display(), bak = %bak.display(), "journal corrupt, rotating");
            std::fs::rename(path, &bak)?;
            let mut clean = File::create(path)?;
            for line in &valid {
                clean.write_all(line.as_bytes())?;
                clean.write_all(b"\n")?;
            }
            clean.sync_all()?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { path: path.to_path_buf(), file, write_seq })
    }

    /// Highest sequence number written so far (0 when empty).
    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    /// Append a record and sync it to disk before returning (write-then-ack).
    pub fn append(&mut self, record: &Workflow) -> Result<u64, JournalError> {
        let seq = self.write_seq + 1;
        let entry = JournalEntry { seq, record: record.clone() };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.sync_data()?;
        self.write_seq = seq;
        Ok(seq)
    }

    /// Read all entries with `seq > after`, stopping at any corruption.
    pub fn entries_after(&self, after: u64) -> Result<Vec<JournalEntry>, JournalError> {
        let mut entries = Vec::new();
        let reader = BufReader::new(File::open(&self.path)?);
        for line in reader.split(b'\n') {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let parsed = std::str::from_utf8(&line)
                .ok()
                .and_then(|s| serde_json::from_str::<JournalEntry>(s).ok());
            match parsed {
                Some(entry) => {
                    if entry.seq > after {
                        entries.push(entry);
                    }
                }
                None => break,
            }
        }
        Ok(entries)
    }

    /// Drop all entries with `seq < before` (journal compaction after a
    /// snapshot). Rewrites the file atomically via a temp-and-rename.
    pub fn truncate_before(&mut self, before: u64) -> Result<(), JournalError> {
        let keep = self.entries_after(0)?;
        let tmp = self.path.with_extension("tmp");
        {
            let mut out = File::create(&tmp)?;
            for entry in keep.iter().filter(|e| e.seq >= before) {
                let mut line = serde_json::to_string(entry)?;
                line.push('\n');
                out.write_all(line.as_bytes())?;
            }
            out.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
