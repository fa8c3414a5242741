// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::EngineConfig;
use crate::engine::EngineDeps;
use crate::registry::LockRegistry;
use crate::router::EventRouter;
use cw_adapters::{FakeProvider, InMemoryTaskStore, InMemoryWorkspaceStore, QueueEventSource};
use cw_core::{FakeClock, WorkflowState};
use cw_storage::WorkflowStore;
use std::time::Duration;
use tempfile::TempDir;

type TestEngine = Engine<InMemoryTaskStore, InMemoryWorkspaceStore, FakeProvider, FakeClock>;
type TestRunner =
    Runner<InMemoryTaskStore, InMemoryWorkspaceStore, FakeProvider, FakeClock, QueueEventSource>;

struct Harness {
    runner: TestRunner,
    engine: Arc<TestEngine>,
    source: Arc<QueueEventSource>,
    provider: FakeProvider,
    clock: FakeClock,
    _dir: TempDir,
}

fn harness(config: EngineConfig) -> Harness {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    clock.set_epoch_secs(1_000_000);
    let store = Arc::new(WorkflowStore::open(dir.path(), clock.clone()).unwrap());
    let locks = Arc::new(LockRegistry::in_memory());
    let router = Arc::new(EventRouter::new());
    let provider = FakeProvider::new();
    let engine = Arc::new(Engine::new(
        store,
        locks,
        router,
        EngineDeps {
            tasks: InMemoryTaskStore::new(),
            workspaces: InMemoryWorkspaceStore::new(),
            provider: provider.clone(),
        },
        clock.clone(),
        config,
        "runner-a",
    ));
    let source = Arc::new(QueueEventSource::new());
    let project = Project {
        provider: ProviderKind::Github,
        owner: "acme".to_string(),
        repo: "widget".to_string(),
        base_branch: "main".to_string(),
    };
    let runner = Runner::new(Arc::clone(&engine), Arc::clone(&source), project, clock.clone());
    Harness { runner, engine, source, provider, clock, _dir: dir }
}

fn issue_appeared(number: u64) -> Event {
    Event::IssueAppeared {
        provider: ProviderKind::Github,
        owner: "acme".to_string(),
        repo: "widget".to_string(),
        number,
        title: "fix the widget".to_string(),
    }
}

#[tokio::test]
async fn discovery_creates_one_workflow_per_issue() {
    let h = harness(EngineConfig::default());
    h.provider.add_issue(42, "fix the widget");
    h.source.push(issue_appeared(42));
    h.source.push(issue_appeared(42)); // duplicate in the same poll

    let cancel = CancellationToken::new();
    h.runner.run_once(&cancel).await;

    let workflows = h.engine.store().list(&WorkflowFilter::default());
    assert_eq!(workflows.len(), 1);
    let wf = &workflows[0];
    assert_eq!(wf.issue_number, 42);
    assert_eq!(wf.base_branch, "main");
    // The discovery tick already advanced it
    assert_eq!(wf.state, WorkflowState::TaskCreated);
}

#[tokio::test]
async fn rediscovered_issue_is_not_duplicated_across_polls() {
    let h = harness(EngineConfig::default());
    h.provider.add_issue(42, "fix the widget");
    let cancel = CancellationToken::new();

    h.source.push(issue_appeared(42));
    h.runner.run_once(&cancel).await;
    h.source.push(issue_appeared(42));
    h.runner.run_once(&cancel).await;

    assert_eq!(h.engine.store().list(&WorkflowFilter::default()).len(), 1);
}

#[tokio::test]
async fn work_reported_routes_by_workflow_id() {
    let h = harness(EngineConfig::default());
    h.provider.add_issue(42, "fix the widget");
    h.source.push(issue_appeared(42));
    let cancel = CancellationToken::new();
    h.runner.run_once(&cancel).await;

    let id = h.engine.store().list(&WorkflowFilter::default())[0].id;
    h.source
        .push(Event::WorkReported { workflow_id: id, success: true, summary: None });
    h.runner.run_once(&cancel).await;

    // The event was queued for that workflow (and consumed by its tick)
    assert_eq!(h.engine.router().pending(id), 0);
}

#[tokio::test]
async fn pr_events_for_unknown_prs_are_dropped() {
    let h = harness(EngineConfig::default());
    h.source.push(Event::PrMerged { number: 77 });
    let cancel = CancellationToken::new();

    h.runner.run_once(&cancel).await;

    assert!(h.engine.store().list(&WorkflowFilter::default()).is_empty());
}

#[tokio::test]
async fn dispatch_caps_concurrent_ticks_per_poll() {
    let h = harness(EngineConfig::default().max_concurrent_workflows(2));
    for number in 1..=4 {
        h.provider.add_issue(number, "issue");
        h.source.push(issue_appeared(number));
    }
    let cancel = CancellationToken::new();
    h.runner.run_once(&cancel).await;

    // Only the first two candidates got a tick this poll
    let advanced = h
        .engine
        .store()
        .list(&WorkflowFilter::default())
        .into_iter()
        .filter(|wf| wf.state == WorkflowState::TaskCreated)
        .count();
    assert_eq!(advanced, 2);

    // The rest catch up on the next poll
    h.runner.run_once(&cancel).await;
    let advanced = h
        .engine
        .store()
        .list(&WorkflowFilter::default())
        .into_iter()
        .filter(|wf| wf.state == WorkflowState::TaskCreated)
        .count();
    assert_eq!(advanced, 4);
}

#[tokio::test]
async fn locked_workflows_are_skipped() {
    let h = harness(EngineConfig::default());
    h.provider.add_issue(42, "fix the widget");
    h.source.push(issue_appeared(42));
    let cancel = CancellationToken::new();
    h.runner.run_once(&cancel).await;

    let id = h.engine.store().list(&WorkflowFilter::default())[0].id;
    h.engine.locks().try_acquire(id, "runner-b", Duration::from_secs(300), h.clock.epoch_secs());

    let before = h.engine.store().get(id).unwrap();
    h.runner.run_once(&cancel).await;
    let after = h.engine.store().get(id).unwrap();
    assert_eq!(before.state, after.state);
}

#[tokio::test]
async fn run_releases_own_locks_on_shutdown() {
    let h = harness(EngineConfig::default().poll_interval(Duration::from_millis(10)));
    let cancel = CancellationToken::new();

    // Simulate a lock left behind by a dispatched tick
    h.engine.locks().try_acquire(9, "runner-a", Duration::from_secs(300), h.clock.epoch_secs());
    h.engine.locks().try_acquire(8, "runner-b", Duration::from_secs(300), h.clock.epoch_secs());

    cancel.cancel();
    h.runner.run(cancel).await;

    let remaining = h.engine.locks().list_locks();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].owner, "runner-b");
}
