// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end engine scenarios over the real store and lock registry, with
//! in-memory collaborators and a controllable clock.

use cw_adapters::{FakeProvider, InMemoryTaskStore, InMemoryWorkspaceStore};
use cw_core::{
    Clock, Event, FakeClock, ProviderKind, TaskStatus, Workflow, WorkflowSpec, WorkflowState,
    WorkflowStateKind,
};
use cw_engine::{Engine, EngineConfig, EngineDeps, EventRouter, LockRegistry, ProcessResult,
    Watchdog,
};
use cw_storage::WorkflowStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

type TestEngine = Engine<InMemoryTaskStore, InMemoryWorkspaceStore, FakeProvider, FakeClock>;

struct World {
    store: Arc<WorkflowStore<FakeClock>>,
    locks: Arc<LockRegistry>,
    router: Arc<EventRouter>,
    engine: Arc<TestEngine>,
    provider: FakeProvider,
    tasks: InMemoryTaskStore,
    workspaces: InMemoryWorkspaceStore,
    clock: FakeClock,
    cancel: CancellationToken,
    _dir: TempDir,
}

impl World {
    fn new(config: EngineConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let clock = FakeClock::new();
        clock.set_epoch_secs(1_000_000);
        let store =
            Arc::new(WorkflowStore::open(&dir.path().join("workflows"), clock.clone()).unwrap());
        let locks =
            Arc::new(LockRegistry::open(&dir.path().join("workflows/locks")).unwrap());
        let router = Arc::new(EventRouter::new());
        let provider = FakeProvider::new();
        let tasks = InMemoryTaskStore::new();
        let workspaces = InMemoryWorkspaceStore::new();
        let engine = Arc::new(Self::engine_for(
            "runner-a", &store, &locks, &router, &provider, &tasks, &workspaces, &clock, &config,
        ));
        Self {
            store,
            locks,
            router,
            engine,
            provider,
            tasks,
            workspaces,
            clock,
            cancel: CancellationToken::new(),
            _dir: dir,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn engine_for(
        owner_id: &str,
        store: &Arc<WorkflowStore<FakeClock>>,
        locks: &Arc<LockRegistry>,
        router: &Arc<EventRouter>,
        provider: &FakeProvider,
        tasks: &InMemoryTaskStore,
        workspaces: &InMemoryWorkspaceStore,
        clock: &FakeClock,
        config: &EngineConfig,
    ) -> TestEngine {
        Engine::new(
            Arc::clone(store),
            Arc::clone(locks),
            Arc::clone(router),
            EngineDeps {
                tasks: tasks.clone(),
                workspaces: workspaces.clone(),
                provider: provider.clone(),
            },
            clock.clone(),
            config.clone(),
            owner_id,
        )
    }

    /// A second runner sharing this world's store, registry, and queues.
    fn second_runner(&self, owner_id: &str, config: EngineConfig) -> TestEngine {
        Self::engine_for(
            owner_id,
            &self.store,
            &self.locks,
            &self.router,
            &self.provider,
            &self.tasks,
            &self.workspaces,
            &self.clock,
            &config,
        )
    }

    fn discover(&self, issue: u64, config: &EngineConfig) -> u64 {
        let spec = WorkflowSpec::new(ProviderKind::Github, "acme", "widget", issue)
            .config(config.workflow_config());
        self.store.create(spec).unwrap().id
    }

    async fn tick(&self, id: u64) -> ProcessResult {
        self.engine.process(id, &self.cancel).await
    }

    fn workflow(&self, id: u64) -> Workflow {
        self.store.get(id).unwrap()
    }

    /// Tick until the workflow reaches `target`, recording each persisted
    /// state along the way, pushing scripted events as states are reached.
    async fn drive_to(
        &self,
        id: u64,
        target: WorkflowState,
        trace: &mut Vec<WorkflowStateKind>,
    ) {
        for _ in 0..32 {
            let wf = self.workflow(id);
            if wf.state == target {
                return;
            }
            match &wf.state {
                WorkflowState::AgentWorking => {
                    self.router.push(
                        id,
                        Event::WorkReported { workflow_id: id, success: true, summary: None },
                    );
                }
                WorkflowState::PrChangesRequested => {
                    self.router.push(
                        id,
                        Event::WorkReported { workflow_id: id, success: true, summary: None },
                    );
                }
                WorkflowState::PrOpen => {
                    let number = wf.pr_number.unwrap();
                    self.router.push(id, Event::PrReviewApproved { number });
                }
                WorkflowState::PrApproved => {
                    let number = wf.pr_number.unwrap();
                    self.router.push(id, Event::PrMerged { number });
                }
                _ => {}
            }
            self.tick(id).await;
            let state = self.workflow(id).state;
            if trace.last() != Some(&state.kind()) {
                trace.push(state.kind());
            }
        }
        panic!("workflow {id} did not reach {target}, at {}", self.workflow(id).state);
    }
}

use WorkflowStateKind as K;

const HAPPY_PATH: [K; 11] = [
    K::Discovered,
    K::TaskCreated,
    K::WorkspaceProvisioning,
    K::WorkspaceReady,
    K::AgentWorking,
    K::ChangesReported,
    K::BranchPushed,
    K::PrOpen,
    K::PrApproved,
    K::PrMerged,
    K::Closed,
];

/// S1: one open issue, driven straight through to Closed.
#[tokio::test]
async fn s1_happy_path() {
    let config = EngineConfig::default().poll_interval(Duration::from_secs(1));
    let world = World::new(config.clone());
    world.provider.add_issue(42, "fix the widget");

    let id = world.discover(42, &config);
    let mut trace = vec![world.workflow(id).state.kind()];
    world.drive_to(id, WorkflowState::Closed, &mut trace).await;

    assert_eq!(trace, HAPPY_PATH);

    // Exactly one task, one workspace, one PR
    assert_eq!(world.tasks.created_count(), 1);
    assert_eq!(world.workspaces.created_count(), 1);
    assert_eq!(world.provider.pr_count(), 1);

    let wf = world.workflow(id);
    assert!(wf.ended_at.is_some());
    assert_eq!(world.tasks.task_statuses(), vec![TaskStatus::Completed]);
    assert_eq!(world.provider.closed_issues(), vec![42]);
}

/// S2: first review requests changes; one revision loop, no second PR.
#[tokio::test]
async fn s2_revision_loop() {
    let config = EngineConfig::default();
    let world = World::new(config.clone());
    world.provider.add_issue(42, "fix the widget");

    let id = world.discover(42, &config);
    let mut trace = vec![world.workflow(id).state.kind()];
    world.drive_to(id, WorkflowState::PrOpen, &mut trace).await;

    let number = world.workflow(id).pr_number.unwrap();
    world.router.push(id, Event::PrChangesRequested { number });
    world.tick(id).await;
    trace.push(world.workflow(id).state.kind());

    world.drive_to(id, WorkflowState::Closed, &mut trace).await;

    let expected_tail = [
        K::PrChangesRequested,
        K::ChangesReported,
        K::BranchPushed,
        K::PrOpen,
        K::PrApproved,
        K::PrMerged,
        K::Closed,
    ];
    assert!(trace.ends_with(&expected_tail), "unexpected tail: {trace:?}");

    let wf = world.workflow(id);
    assert_eq!(wf.revision_count, 1);
    assert_eq!(wf.pr_number, Some(number));
    // The second pass adopted the open PR instead of opening another
    assert_eq!(world.provider.pr_count(), 1);
    assert_eq!(world.provider.open_pr_calls(), 1);
}

/// S3: two runners race on one workflow; exactly one advances.
#[tokio::test]
async fn s3_contention() {
    let config = EngineConfig::default();
    let world = World::new(config.clone());
    world.provider.add_issue(42, "fix the widget");
    let id = world.discover(42, &config);

    let runner_b = world.second_runner("runner-b", config);
    let cancel = CancellationToken::new();

    let (a, b) = tokio::join!(world.tick(id), runner_b.process(id, &cancel));

    let advanced = |r: &ProcessResult| matches!(r, ProcessResult::Advanced { .. });
    let locked = |r: &ProcessResult| matches!(r, ProcessResult::Locked { .. });
    assert!(
        (advanced(&a) && locked(&b)) || (locked(&a) && advanced(&b)),
        "expected one winner, got {a:?} / {b:?}"
    );

    // The record advanced by exactly one state
    assert_eq!(world.workflow(id).state, WorkflowState::TaskCreated);
}

/// S4: PR #99 was opened upstream, then the store write failed. The next
/// tick adopts the existing PR instead of opening a duplicate.
#[tokio::test]
async fn s4_crash_after_side_effect_before_persist() {
    let config = EngineConfig::default();
    let world = World::new(config.clone());
    world.provider.add_issue(42, "fix the widget");
    let id = world.discover(42, &config);

    let mut trace = Vec::new();
    world.drive_to(id, WorkflowState::BranchPushed, &mut trace).await;

    // Crash simulation: the PR exists upstream, the record never saw it
    let branch = world.workflow(id).feature_branch.clone().unwrap();
    world.provider.seed_pr(99, &branch);
    assert_eq!(world.workflow(id).state, WorkflowState::BranchPushed);

    let result = world.tick(id).await;

    assert_eq!(
        result,
        ProcessResult::Advanced { from: K::BranchPushed, to: K::PrOpen }
    );
    let wf = world.workflow(id);
    assert_eq!(wf.pr_number, Some(99));
    assert_eq!(world.provider.open_pr_calls(), 0);
    assert_eq!(world.provider.pr_count(), 1);
}

/// S5: a workflow stuck in AgentWorking past its abandon TTL is abandoned,
/// its task cancelled and its workspace deletion requested.
#[tokio::test]
async fn s5_abandonment() {
    let config = EngineConfig::default().abandon_ttl(Duration::from_secs(600));
    let world = World::new(config.clone());
    world.provider.add_issue(42, "fix the widget");
    let id = world.discover(42, &config);

    let mut trace = Vec::new();
    world.drive_to(id, WorkflowState::AgentWorking, &mut trace).await;
    let workspace_id = world.workflow(id).workspace_id.clone().unwrap();

    world.clock.advance(Duration::from_secs(601));
    let result = world.tick(id).await;

    assert_eq!(
        result,
        ProcessResult::Advanced { from: K::AgentWorking, to: K::Abandoned }
    );
    let wf = world.workflow(id);
    assert!(wf.ended_at.is_some());
    assert_eq!(world.tasks.task_statuses(), vec![TaskStatus::Cancelled]);
    assert_eq!(world.workspaces.deleted(), vec![workspace_id]);
}

/// S6: a worker acquires with a 5s TTL and hangs; with a 10s watchdog the
/// lock is reacquirable within lock_ttl + watchdog_interval.
#[tokio::test]
async fn s6_lock_reclaim() {
    let config = EngineConfig::default().lock_ttl(Duration::from_secs(5));
    let world = World::new(config.clone());
    world.provider.add_issue(42, "fix the widget");
    let id = world.discover(42, &config);

    // Worker A acquires and hangs
    world.locks.try_acquire(id, "hung-worker", Duration::from_secs(5), world.clock.epoch_secs());

    let watchdog = Watchdog::new(
        Arc::clone(&world.locks),
        Arc::clone(&world.router),
        world.clock.clone(),
        Duration::from_secs(10),
    );

    // First watchdog pass lands before expiry: nothing reclaimed
    world.clock.advance(Duration::from_secs(4));
    assert!(watchdog.sweep().is_empty());

    // Next pass (within lock_ttl + watchdog_interval = 15s) reclaims it
    world.clock.advance(Duration::from_secs(10));
    assert_eq!(watchdog.sweep(), vec![id]);

    // Another runner now advances the workflow
    let runner_b = world.second_runner("runner-b", config);
    let cancel = CancellationToken::new();
    let result = runner_b.process(id, &cancel).await;
    assert!(matches!(result, ProcessResult::Advanced { .. }), "got {result:?}");
}

/// Crash recovery at the store level: a reopened world resumes mid-pipeline.
#[tokio::test]
async fn store_reopen_resumes_mid_pipeline() {
    let config = EngineConfig::default();
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    clock.set_epoch_secs(1_000_000);

    let id = {
        let store =
            Arc::new(WorkflowStore::open(&dir.path().join("workflows"), clock.clone()).unwrap());
        let spec = WorkflowSpec::new(ProviderKind::Github, "acme", "widget", 42)
            .config(config.workflow_config());
        let wf = store.create(spec).unwrap();
        store.update(wf.id, |w| w.state = WorkflowState::TaskCreated).unwrap();
        wf.id
        // Dropped without close(): journal-only recovery
    };

    let store =
        Arc::new(WorkflowStore::open(&dir.path().join("workflows"), clock.clone()).unwrap());
    let recovered = store.get(id).unwrap();
    assert_eq!(recovered.state, WorkflowState::TaskCreated);
    assert_eq!(recovered.issue_number, 42);
}
