// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot persistence for crash recovery.
//!
//! Snapshots store the complete workflow index at a point in time,
//! identified by the journal sequence number. Recovery loads the snapshot
//! and replays journal entries after that sequence.

use chrono::{DateTime, Utc};
use cw_core::{Clock, Workflow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current snapshot schema version
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

/// Errors that can occur in snapshot operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported snapshot version {0}")]
    Version(u32),
}

/// A snapshot of the workflow index at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Schema version for migrations
    #[serde(rename = "v")]
    pub version: u32,
    /// Journal sequence number at the time of snapshot
    pub seq: u64,
    /// The complete workflow index
    pub workflows: HashMap<u64, Workflow>,
    /// When this snapshot was created
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(seq: u64, workflows: HashMap<u64, Workflow>, clock: &impl Clock) -> Self {
        let created_at = DateTime::from_timestamp(clock.epoch_secs(), 0).unwrap_or_default();
        Self { version: CURRENT_SNAPSHOT_VERSION, seq, workflows, created_at }
    }

    /// Write the snapshot as zstd-compressed JSON, atomically via
    /// temp-and-rename.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let json = serde_json::to_vec(self)?;
        let compressed = zstd::encode_all(json.as_slice(), 3)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, compressed)?;
        File::open(&tmp)?.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load a snapshot, tolerating absence and corruption.
    ///
    /// Returns `Ok(None)` when no snapshot exists. A corrupt file is rotated
    /// to a `.bak` and treated as absent so recovery can continue from the
    /// journal. An unsupported schema version is a hard error.
    pub fn load(path: &Path) -> Result<Option<Self>, SnapshotError> {
        if !path.exists() {
            return Ok(None);
        }
        let compressed = fs::read(path)?;
        let decoded = zstd::decode_all(compressed.as_slice())
            .ok()
            .and_then(|json| serde_json::from_slice::<Snapshot>(&json).ok());
        let snapshot = match decoded {
            Some(s) => s,
            None => {
                let bak = rotate_bak_path(path);
                tracing::warn!(path = %path.display(), bak = %bak.display(), "snapshot corrupt, rotating");
                fs::rename(path, &bak)?;
                return Ok(None);
            }
        };
        if snapshot.version > CURRENT_SNAPSHOT_VERSION {
            return Err(SnapshotError::Version(snapshot.version));
        }
        Ok(Some(snapshot))
    }
}

/// How many rotated backups of a corrupt file are kept around.
const SNAPSHOT_BACKUPS: usize = 3;

/// Reserve the `.bak` slot for a corrupt file.
///
/// Backups occupy `.bak`, `.bak.2`, `.bak.3` from newest to oldest. Each
/// rotation drops the deepest slot and ripples the surviving backups one
/// slot down, leaving `.bak` free for the caller to rename into.
pub(crate) fn rotate_bak_path(path: &Path) -> PathBuf {
    let slots: Vec<PathBuf> = (1..=SNAPSHOT_BACKUPS)
        .map(|depth| match depth {
            1 => path.with_extension("bak"),
            deeper => path.with_extension(format!("bak.{deeper}")),
        })
        .collect();

    if let Some(deepest) = slots.last() {
        let _ = fs::remove_file(deepest);
    }
    for shallower in (0..slots.len() - 1).rev() {
        if slots[shallower].exists() {
            let _ = fs::rename(&slots[shallower], &slots[shallower + 1]);
        }
    }
    slots[0].clone()
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
