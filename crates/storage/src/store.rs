// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable workflow store: in-memory index over journal + snapshot.
//!
//! The store exclusively owns the persistent representation of every
//! workflow. Updates run a caller-supplied mutator inside a per-store
//! exclusive section, enforce the record invariants, and are journaled
//! durably before the call returns. Terminal records are retained
//! indefinitely and refuse further mutation.

use crate::journal::{Journal, JournalError};
use crate::snapshot::{Snapshot, SnapshotError};
use cw_core::{
    Clock, InvariantViolation, ProviderKind, Workflow, WorkflowSpec, WorkflowStateKind,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Journal entries accumulated before an automatic compaction.
const COMPACT_THRESHOLD: u64 = 512;

/// Errors from workflow store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("workflow {0} not found")]
    NotFound(u64),
    #[error("workflow {0} is terminal and cannot be mutated")]
    Terminal(u64),
    #[error("mutator changed identity fields of workflow {0}")]
    IdentityChanged(u64),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Filter for `list`. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct WorkflowFilter {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub provider: Option<ProviderKind>,
    pub states: Option<Vec<WorkflowStateKind>>,
    pub non_terminal_only: bool,
}

impl WorkflowFilter {
    pub fn non_terminal() -> Self {
        Self { non_terminal_only: true, ..Self::default() }
    }

    fn matches(&self, wf: &Workflow) -> bool {
        if let Some(owner) = &self.owner {
            if &wf.owner != owner {
                return false;
            }
        }
        if let Some(repo) = &self.repo {
            if &wf.repo != repo {
                return false;
            }
        }
        if let Some(provider) = self.provider {
            if wf.provider != provider {
                return false;
            }
        }
        if let Some(states) = &self.states {
            if !states.contains(&wf.state.kind()) {
                return false;
            }
        }
        if self.non_terminal_only && wf.is_terminal() {
            return false;
        }
        true
    }
}

struct Inner {
    index: HashMap<u64, Workflow>,
    journal: Journal,
    snapshot_seq: u64,
}

/// Durable, project-scoped store of workflow records.
pub struct WorkflowStore<C: Clock> {
    dir: PathBuf,
    clock: C,
    inner: Mutex<Inner>,
}

impl<C: Clock> WorkflowStore<C> {
    /// Open the store rooted at `dir` (the `.cw/workflows` directory),
    /// loading the snapshot and replaying the journal tail.
    pub fn open(dir: &Path, clock: C) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let snapshot = Snapshot::load(&dir.join("snapshot"))?;
        let (mut index, snapshot_seq) = match snapshot {
            Some(s) => (s.workflows, s.seq),
            None => (HashMap::new(), 0),
        };
        let journal = Journal::open(&dir.join("log"), snapshot_seq)?;
        let mut replayed = 0usize;
        for entry in journal.entries_after(snapshot_seq)? {
            index.insert(entry.record.id, entry.record);
            replayed += 1;
        }
        tracing::debug!(
            dir = %dir.display(),
            workflows = index.len(),
            replayed,
            "workflow store opened"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            clock,
            inner: Mutex::new(Inner { index, journal, snapshot_seq }),
        })
    }

    /// Directory this store is rooted at.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create a workflow with a freshly allocated monotonic id.
    pub fn create(&self, spec: WorkflowSpec) -> Result<Workflow, StoreError> {
        let mut inner = self.inner.lock();
        let id = inner.index.keys().max().copied().unwrap_or(0) + 1;
        let wf = Workflow::new(id, spec, &self.clock);
        inner.journal.append(&wf)?;
        inner.index.insert(id, wf.clone());
        tracing::info!(workflow = id, issue = wf.issue_number, "workflow created");
        Ok(wf)
    }

    /// Get a workflow by id.
    pub fn get(&self, id: u64) -> Result<Workflow, StoreError> {
        self.inner.lock().index.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    /// List workflows matching `filter`, ordered by id.
    pub fn list(&self, filter: &WorkflowFilter) -> Vec<Workflow> {
        let inner = self.inner.lock();
        let mut out: Vec<Workflow> =
            inner.index.values().filter(|wf| filter.matches(wf)).cloned().collect();
        out.sort_by_key(|wf| wf.id);
        out
    }

    /// Find the workflow tracking a given upstream issue.
    pub fn find_by_issue(
        &self,
        provider: ProviderKind,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Option<Workflow> {
        self.inner
            .lock()
            .index
            .values()
            .find(|wf| {
                wf.provider == provider
                    && wf.owner == owner
                    && wf.repo == repo
                    && wf.issue_number == number
            })
            .cloned()
    }

    /// Find the non-terminal workflow whose pull request is `number`.
    pub fn find_by_pr(&self, owner: &str, repo: &str, number: u64) -> Option<Workflow> {
        self.inner
            .lock()
            .index
            .values()
            .find(|wf| {
                wf.owner == owner
                    && wf.repo == repo
                    && wf.pr_number == Some(number)
                    && !wf.is_terminal()
            })
            .cloned()
    }

    /// Apply `mutator` to the record inside the store's exclusive section
    /// and persist the result durably before returning.
    ///
    /// Rejects mutation of terminal records, mutators that touch identity
    /// fields, and results that violate the record invariants. `updated_at`
    /// is stamped monotonically by the store, never by the mutator.
    pub fn update<F>(&self, id: u64, mutator: F) -> Result<Workflow, StoreError>
    where
        F: FnOnce(&mut Workflow),
    {
        let mut inner = self.inner.lock();
        let current = inner.index.get(&id).ok_or(StoreError::NotFound(id))?;
        if current.is_terminal() {
            return Err(StoreError::Terminal(id));
        }

        let mut next = current.clone();
        mutator(&mut next);
        if next.id != current.id
            || next.created_at != current.created_at
            || next.issue_number != current.issue_number
            || next.provider != current.provider
        {
            return Err(StoreError::IdentityChanged(id));
        }
        next.updated_at = self.clock.epoch_secs().max(current.updated_at);
        // Reject violations the mutator introduced. A record that was
        // already broken on disk may still be written (the engine moves
        // such records to Failed rather than repairing them).
        if let Err(violation) = next.check_invariants() {
            if current.check_invariants().is_ok() {
                return Err(StoreError::Invariant(violation));
            }
        }

        inner.journal.append(&next)?;
        inner.index.insert(id, next.clone());

        if inner.journal.write_seq().saturating_sub(inner.snapshot_seq) >= COMPACT_THRESHOLD {
            self.compact_locked(&mut inner)?;
        }
        Ok(next)
    }

    /// Write a snapshot of the current index and drop the journal prefix it
    /// covers.
    pub fn compact(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        self.compact_locked(&mut inner)
    }

    fn compact_locked(&self, inner: &mut Inner) -> Result<(), StoreError> {
        let seq = inner.journal.write_seq();
        if seq == inner.snapshot_seq {
            return Ok(());
        }
        let snapshot = Snapshot::new(seq, inner.index.clone(), &self.clock);
        snapshot.save(&self.dir.join("snapshot"))?;
        inner.journal.truncate_before(seq + 1)?;
        inner.snapshot_seq = seq;
        tracing::debug!(seq, "workflow store compacted");
        Ok(())
    }

    /// Flush pending state: takes a final snapshot so reopening is cheap.
    pub fn close(&self) -> Result<(), StoreError> {
        self.compact()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
