// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cw-storage: Durable persistence for workflow records.
//!
//! The on-disk layout under `<project>/.cw/workflows/` is an append-only
//! journal (`log`) plus a compacted snapshot (`snapshot`). Every update is
//! written durably before the call returns; reads are served from an
//! in-memory index rebuilt on open by loading the snapshot and replaying the
//! journal tail.

pub mod journal;
pub mod snapshot;
pub mod store;

pub use journal::{Journal, JournalEntry, JournalError};
pub use snapshot::{Snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
pub use store::{StoreError, WorkflowFilter, WorkflowStore};
