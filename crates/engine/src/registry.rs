// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exclusive per-workflow advisory locks with TTL.
//!
//! The registry is the only mutex-guarded in-memory structure shared across
//! workers. Every acquisition bumps a per-workflow generation counter so
//! stale holders cannot release or refresh a lock they no longer own.
//! Optionally journaled to disk (one file per live lock, unlinked on
//! release) so crash recovery observes still-live leases.
//!
//! Lock operations never retry internally; contention is signalled to the
//! caller, who decides whether to back off.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Why a lock stopped being held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    Normal,
    Forced,
    Expired,
}

cw_core::simple_display! {
    ReleaseReason {
        Normal => "normal",
        Forced => "forced",
        Expired => "expired",
    }
}

/// A live lease on one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub workflow_id: u64,
    pub owner: String,
    pub generation: u64,
    pub acquired_at: i64,
    pub expires_at: i64,
}

impl Lock {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Outcome of `try_acquire`: atomic check-and-set, never blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireResult {
    Acquired { generation: u64 },
    HeldBy { owner: String, expires_at: i64 },
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("workflow {0} is not locked")]
    NotHeld(u64),
    #[error("stale generation for workflow {workflow_id}: held={held}, caller={caller}")]
    StaleGeneration { workflow_id: u64, held: u64, caller: u64 },
}

/// One line of the release-reason log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRecord {
    pub workflow_id: u64,
    pub owner: String,
    pub generation: u64,
    pub reason: ReleaseReason,
    pub released_at: i64,
}

const RELEASE_HISTORY_CAP: usize = 128;

struct Inner {
    live: HashMap<u64, Lock>,
    /// Last generation handed out per workflow; survives release so a new
    /// acquisition always invalidates stale holders.
    generations: HashMap<u64, u64>,
    history: VecDeque<ReleaseRecord>,
}

/// In-memory lock table with an optional on-disk journal.
pub struct LockRegistry {
    journal_dir: Option<PathBuf>,
    inner: Mutex<Inner>,
}

impl LockRegistry {
    /// Registry without a journal (tests, single-process runs).
    pub fn in_memory() -> Self {
        Self {
            journal_dir: None,
            inner: Mutex::new(Inner {
                live: HashMap::new(),
                generations: HashMap::new(),
                history: VecDeque::new(),
            }),
        }
    }

    /// Registry journaled under `dir` (the `.cw/workflows/locks` directory).
    ///
    /// Existing lock files are loaded as live leases; expired ones are left
    /// for the next watchdog sweep to clear.
    pub fn open(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let mut live = HashMap::new();
        let mut generations = HashMap::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "lock") {
                continue;
            }
            let lock = std::fs::read(&path)
                .ok()
                .and_then(|bytes| serde_json::from_slice::<Lock>(&bytes).ok());
            match lock {
                Some(lock) => {
                    generations.insert(lock.workflow_id, lock.generation);
                    live.insert(lock.workflow_id, lock);
                }
                None => {
                    tracing::warn!(path = %path.display(), "unreadable lock file, removing");
                    let _ = std::fs::remove_file(&path);
                }
            }
        }
        tracing::debug!(dir = %dir.display(), live = live.len(), "lock registry opened");
        Ok(Self {
            journal_dir: Some(dir.to_path_buf()),
            inner: Mutex::new(Inner { live, generations, history: VecDeque::new() }),
        })
    }

    /// Acquire the lock on `workflow_id` if free or expired.
    pub fn try_acquire(
        &self,
        workflow_id: u64,
        owner: &str,
        ttl: Duration,
        now: i64,
    ) -> AcquireResult {
        let mut inner = self.inner.lock();
        if let Some(held) = inner.live.get(&workflow_id) {
            if !held.is_expired(now) {
                return AcquireResult::HeldBy {
                    owner: held.owner.clone(),
                    expires_at: held.expires_at,
                };
            }
            // Expired in place: record the implicit release before taking over
            let record = ReleaseRecord {
                workflow_id,
                owner: held.owner.clone(),
                generation: held.generation,
                reason: ReleaseReason::Expired,
                released_at: now,
            };
            Self::push_history(&mut inner.history, record);
        }
        let generation = inner.generations.get(&workflow_id).copied().unwrap_or(0) + 1;
        let lock = Lock {
            workflow_id,
            owner: owner.to_string(),
            generation,
            acquired_at: now,
            expires_at: now + ttl.as_secs() as i64,
        };
        inner.generations.insert(workflow_id, generation);
        inner.live.insert(workflow_id, lock.clone());
        self.journal_write(&lock);
        tracing::debug!(workflow = workflow_id, owner, generation, "lock acquired");
        AcquireResult::Acquired { generation }
    }

    /// Extend the deadline if the caller still holds the live generation.
    pub fn refresh(
        &self,
        workflow_id: u64,
        generation: u64,
        ttl: Duration,
        now: i64,
    ) -> Result<i64, LockError> {
        let mut inner = self.inner.lock();
        let lock = inner.live.get_mut(&workflow_id).ok_or(LockError::NotHeld(workflow_id))?;
        if lock.generation != generation {
            return Err(LockError::StaleGeneration {
                workflow_id,
                held: lock.generation,
                caller: generation,
            });
        }
        lock.expires_at = now + ttl.as_secs() as i64;
        let lock = lock.clone();
        self.journal_write(&lock);
        Ok(lock.expires_at)
    }

    /// Release if the caller's generation matches the live lock.
    pub fn release(
        &self,
        workflow_id: u64,
        generation: u64,
        reason: ReleaseReason,
        now: i64,
    ) -> Result<(), LockError> {
        let mut inner = self.inner.lock();
        let lock = inner.live.get(&workflow_id).ok_or(LockError::NotHeld(workflow_id))?;
        if lock.generation != generation {
            return Err(LockError::StaleGeneration {
                workflow_id,
                held: lock.generation,
                caller: generation,
            });
        }
        let lock = inner.live.remove(&workflow_id).ok_or(LockError::NotHeld(workflow_id))?;
        let record = ReleaseRecord {
            workflow_id,
            owner: lock.owner,
            generation,
            reason,
            released_at: now,
        };
        Self::push_history(&mut inner.history, record);
        self.journal_unlink(workflow_id);
        tracing::debug!(workflow = workflow_id, generation, %reason, "lock released");
        Ok(())
    }

    /// Admin override: drop the lock whatever its owner, bumping the
    /// generation so the previous holder's release attempts go stale.
    pub fn force_release(&self, workflow_id: u64, now: i64) -> Option<Lock> {
        let mut inner = self.inner.lock();
        let lock = inner.live.remove(&workflow_id)?;
        let next_gen = inner.generations.get(&workflow_id).copied().unwrap_or(0) + 1;
        inner.generations.insert(workflow_id, next_gen);
        let record = ReleaseRecord {
            workflow_id,
            owner: lock.owner.clone(),
            generation: lock.generation,
            reason: ReleaseReason::Forced,
            released_at: now,
        };
        Self::push_history(&mut inner.history, record);
        self.journal_unlink(workflow_id);
        tracing::warn!(workflow = workflow_id, owner = %lock.owner, "lock force-released");
        Some(lock)
    }

    /// Release every live lock held by `owner` (runner shutdown).
    pub fn release_owned(&self, owner: &str, now: i64) -> Vec<u64> {
        let ids: Vec<u64> = {
            let inner = self.inner.lock();
            inner
                .live
                .values()
                .filter(|lock| lock.owner == owner)
                .map(|lock| lock.workflow_id)
                .collect()
        };
        for &id in &ids {
            let _ = self.force_release(id, now);
        }
        ids
    }

    pub fn list_locks(&self) -> Vec<Lock> {
        let inner = self.inner.lock();
        let mut locks: Vec<Lock> = inner.live.values().cloned().collect();
        locks.sort_by_key(|lock| lock.workflow_id);
        locks
    }

    /// Drop every expired lease, returning the workflow ids released.
    pub fn sweep_expired(&self, now: i64) -> Vec<u64> {
        let mut inner = self.inner.lock();
        let expired: Vec<u64> = inner
            .live
            .values()
            .filter(|lock| lock.is_expired(now))
            .map(|lock| lock.workflow_id)
            .collect();
        for &id in &expired {
            if let Some(lock) = inner.live.remove(&id) {
                let record = ReleaseRecord {
                    workflow_id: id,
                    owner: lock.owner.clone(),
                    generation: lock.generation,
                    reason: ReleaseReason::Expired,
                    released_at: now,
                };
                Self::push_history(&mut inner.history, record);
                tracing::warn!(workflow = id, owner = %lock.owner, "expired lock swept");
            }
            self.journal_unlink(id);
        }
        expired
    }

    /// Recent releases, oldest first (bounded).
    pub fn release_history(&self) -> Vec<ReleaseRecord> {
        self.inner.lock().history.iter().cloned().collect()
    }

    fn push_history(history: &mut VecDeque<ReleaseRecord>, record: ReleaseRecord) {
        if history.len() == RELEASE_HISTORY_CAP {
            history.pop_front();
        }
        history.push_back(record);
    }

    // Journal writes are best-effort: lock correctness lives in memory, the
    // files only seed recovery after a crash.
    fn journal_write(&self, lock: &Lock) {
        let Some(dir) = &self.journal_dir else { return };
        let path = dir.join(format!("{}.lock", lock.workflow_id));
        let write = serde_json::to_vec(lock)
            .map_err(std::io::Error::other)
            .and_then(|bytes| std::fs::write(&path, bytes));
        if let Err(e) = write {
            tracing::warn!(workflow = lock.workflow_id, error = %e, "lock journal write failed");
        }
    }

    fn journal_unlink(&self, workflow_id: u64) {
        let Some(dir) = &self.journal_dir else { return };
        let _ = std::fs::remove_file(dir.join(format!("{workflow_id}.lock")));
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
