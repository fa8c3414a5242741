// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cw_core::{FakeClock, WorkflowBuilder};
use tempfile::tempdir;

fn index(ids: &[u64]) -> HashMap<u64, Workflow> {
    ids.iter().map(|&id| (id, WorkflowBuilder::default().id(id).build())).collect()
}

fn clock_at(epoch_secs: i64) -> FakeClock {
    let clock = FakeClock::new();
    clock.set_epoch_secs(epoch_secs);
    clock
}

#[test]
fn save_and_load_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot");

    let snapshot = Snapshot::new(17, index(&[1, 2, 3]), &clock_at(1_700_000_000));
    snapshot.save(&path).unwrap();

    let loaded = Snapshot::load(&path).unwrap().unwrap();
    assert_eq!(loaded.version, CURRENT_SNAPSHOT_VERSION);
    assert_eq!(loaded.seq, 17);
    assert_eq!(loaded.workflows.len(), 3);
    assert_eq!(loaded.workflows[&2].id, 2);
}

#[test]
fn created_at_comes_from_the_injected_clock() {
    let snapshot = Snapshot::new(1, index(&[1]), &clock_at(1_700_000_000));
    assert_eq!(snapshot.created_at.timestamp(), 1_700_000_000);
}

#[test]
fn load_missing_returns_none() {
    let dir = tempdir().unwrap();
    assert!(Snapshot::load(&dir.path().join("snapshot")).unwrap().is_none());
}

#[test]
fn load_corrupt_rotates_to_bak() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot");
    std::fs::write(&path, b"definitely not zstd").unwrap();

    let loaded = Snapshot::load(&path).unwrap();
    assert!(loaded.is_none());
    assert!(!path.exists());
    assert!(path.with_extension("bak").exists());
}

#[test]
fn load_rejects_future_version() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot");

    let mut snapshot = Snapshot::new(1, index(&[1]), &clock_at(1_700_000_000));
    snapshot.version = CURRENT_SNAPSHOT_VERSION + 1;
    snapshot.save(&path).unwrap();

    assert!(matches!(Snapshot::load(&path), Err(SnapshotError::Version(_))));
}

#[test]
fn save_is_atomic_no_tmp_left_behind() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot");

    Snapshot::new(5, index(&[1]), &clock_at(1_700_000_000)).save(&path).unwrap();

    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());
}
