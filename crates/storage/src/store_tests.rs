// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cw_core::{FakeClock, WorkflowState};
use tempfile::tempdir;

fn spec(issue: u64) -> WorkflowSpec {
    WorkflowSpec::new(ProviderKind::Github, "acme", "widget", issue)
}

fn open_store(dir: &Path) -> (WorkflowStore<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    clock.set_epoch_secs(1_000_000);
    let store = WorkflowStore::open(dir, clock.clone()).unwrap();
    (store, clock)
}

#[test]
fn create_allocates_monotonic_ids() {
    let dir = tempdir().unwrap();
    let (store, _clock) = open_store(dir.path());

    let a = store.create(spec(1)).unwrap();
    let b = store.create(spec(2)).unwrap();

    assert_eq!(a.id, 1);
    assert_eq!(b.id, 2);
    assert_eq!(a.state, WorkflowState::Discovered);
}

#[test]
fn get_unknown_is_not_found() {
    let dir = tempdir().unwrap();
    let (store, _clock) = open_store(dir.path());
    assert!(matches!(store.get(7), Err(StoreError::NotFound(7))));
}

#[test]
fn update_persists_and_stamps_updated_at() {
    let dir = tempdir().unwrap();
    let (store, clock) = open_store(dir.path());

    let wf = store.create(spec(1)).unwrap();
    clock.advance(std::time::Duration::from_secs(10));

    let updated = store
        .update(wf.id, |w| {
            w.state = WorkflowState::TaskCreated;
        })
        .unwrap();

    assert_eq!(updated.state, WorkflowState::TaskCreated);
    assert_eq!(updated.updated_at, wf.updated_at + 10);
    assert_eq!(store.get(wf.id).unwrap(), updated);
}

#[test]
fn updated_at_is_monotonic_even_if_clock_rewinds() {
    let dir = tempdir().unwrap();
    let (store, clock) = open_store(dir.path());

    let wf = store.create(spec(1)).unwrap();
    clock.set_epoch_secs(999_000);

    let updated = store
        .update(wf.id, |w| {
            w.state = WorkflowState::TaskCreated;
        })
        .unwrap();
    assert_eq!(updated.updated_at, wf.updated_at);
}

#[test]
fn terminal_records_refuse_mutation() {
    let dir = tempdir().unwrap();
    let (store, clock) = open_store(dir.path());

    let wf = store.create(spec(1)).unwrap();
    store
        .update(wf.id, |w| {
            w.state = WorkflowState::Cancelled;
            w.ended_at = Some(clock.epoch_secs());
        })
        .unwrap();

    let err = store.update(wf.id, |w| {
        w.state = WorkflowState::Discovered;
    });
    assert!(matches!(err, Err(StoreError::Terminal(_))));
}

#[test]
fn update_rejects_invariant_violations() {
    let dir = tempdir().unwrap();
    let (store, _clock) = open_store(dir.path());

    let wf = store.create(spec(1)).unwrap();

    // Terminal state without ended_at
    let err = store.update(wf.id, |w| {
        w.state = WorkflowState::Failed;
    });
    assert!(matches!(err, Err(StoreError::Invariant(_))));

    // Rejected update must not be visible
    assert_eq!(store.get(wf.id).unwrap().state, WorkflowState::Discovered);
}

#[test]
fn update_rejects_identity_changes() {
    let dir = tempdir().unwrap();
    let (store, _clock) = open_store(dir.path());

    let wf = store.create(spec(1)).unwrap();
    let err = store.update(wf.id, |w| {
        w.issue_number = 999;
    });
    assert!(matches!(err, Err(StoreError::IdentityChanged(_))));
}

#[test]
fn list_filters_and_orders() {
    let dir = tempdir().unwrap();
    let (store, clock) = open_store(dir.path());

    store.create(spec(1)).unwrap();
    let b = store.create(spec(2)).unwrap();
    store.create(WorkflowSpec::new(ProviderKind::Gitlab, "other", "repo", 3)).unwrap();

    store
        .update(b.id, |w| {
            w.state = WorkflowState::Cancelled;
            w.ended_at = Some(clock.epoch_secs());
        })
        .unwrap();

    let all = store.list(&WorkflowFilter::default());
    assert_eq!(all.iter().map(|w| w.id).collect::<Vec<_>>(), vec![1, 2, 3]);

    let non_terminal = store.list(&WorkflowFilter::non_terminal());
    assert_eq!(non_terminal.iter().map(|w| w.id).collect::<Vec<_>>(), vec![1, 3]);

    let acme = store.list(&WorkflowFilter {
        owner: Some("acme".to_string()),
        non_terminal_only: true,
        ..WorkflowFilter::default()
    });
    assert_eq!(acme.iter().map(|w| w.id).collect::<Vec<_>>(), vec![1]);

    let discovered = store.list(&WorkflowFilter {
        states: Some(vec![WorkflowStateKind::Discovered]),
        ..WorkflowFilter::default()
    });
    assert_eq!(discovered.len(), 2);
}

#[test]
fn find_by_issue_and_pr() {
    let dir = tempdir().unwrap();
    let (store, _clock) = open_store(dir.path());

    let wf = store.create(spec(42)).unwrap();
    store
        .update(wf.id, |w| {
            w.feature_branch = Some("cw/issue-42".to_string());
            w.workspace_id = Some("wks-abc".into());
            w.pr_number = Some(99);
            w.state = WorkflowState::PrOpen;
        })
        .unwrap();

    let found = store.find_by_issue(ProviderKind::Github, "acme", "widget", 42).unwrap();
    assert_eq!(found.id, wf.id);
    assert!(store.find_by_issue(ProviderKind::Gitlab, "acme", "widget", 42).is_none());

    let by_pr = store.find_by_pr("acme", "widget", 99).unwrap();
    assert_eq!(by_pr.id, wf.id);
    assert!(store.find_by_pr("acme", "widget", 100).is_none());
}

#[test]
fn reopen_recovers_from_journal() {
    let dir = tempdir().unwrap();
    {
        let (store, _clock) = open_store(dir.path());
        let wf = store.create(spec(1)).unwrap();
        store
            .update(wf.id, |w| {
                w.state = WorkflowState::TaskCreated;
            })
            .unwrap();
        // No close: recovery must work from the journal alone
    }

    let (store, _clock) = open_store(dir.path());
    let wf = store.get(1).unwrap();
    assert_eq!(wf.state, WorkflowState::TaskCreated);

    // Allocation continues above recovered ids
    assert_eq!(store.create(spec(2)).unwrap().id, 2);
}

#[test]
fn full_log_replay_equals_snapshot_plus_tail() {
    let snapshot_dir = tempdir().unwrap();
    let log_only_dir = tempdir().unwrap();
    {
        let (store, _clock) = open_store(snapshot_dir.path());
        for issue in 1..=5 {
            store.create(spec(issue)).unwrap();
        }
        store.update(3, |w| w.state = WorkflowState::TaskCreated).unwrap();

        // Preserve the full journal before compaction truncates it
        std::fs::copy(snapshot_dir.path().join("log"), log_only_dir.path().join("log")).unwrap();
        store.compact().unwrap();
    }

    // Open A: snapshot + (empty) tail. Open B: full journal onto empty store.
    let (from_snapshot, _clock) = open_store(snapshot_dir.path());
    let (from_log, _clock) = open_store(log_only_dir.path());

    let a = from_snapshot.list(&WorkflowFilter::default());
    let b = from_log.list(&WorkflowFilter::default());
    assert_eq!(a, b);
    assert_eq!(a.len(), 5);
    assert_eq!(a[2].state, WorkflowState::TaskCreated);
}

#[test]
fn close_compacts_journal() {
    let dir = tempdir().unwrap();
    {
        let (store, _clock) = open_store(dir.path());
        store.create(spec(1)).unwrap();
        store.update(1, |w| w.state = WorkflowState::TaskCreated).unwrap();
        store.close().unwrap();
    }

    assert!(dir.path().join("snapshot").exists());

    // After compaction the journal holds no pre-snapshot entries
    let journal = Journal::open(&dir.path().join("log"), 0).unwrap();
    assert!(journal.entries_after(0).unwrap().is_empty());

    let (store, _clock) = open_store(dir.path());
    assert_eq!(store.get(1).unwrap().state, WorkflowState::TaskCreated);
}
