// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-tick workflow driver.
//!
//! `process` runs one tick for one workflow: acquire the lock, load the
//! record, drain pending events in FIFO order, fire at most one transition
//! per event, persist atomically, release. Contention is never waited out;
//! a held lock returns `Locked` and the runner tries again next poll.

use crate::config::EngineConfig;
use crate::effects::EffectChanges;
use crate::error::EngineError;
use crate::machine::{self, Row};
use crate::registry::{AcquireResult, LockRegistry, ReleaseReason};
use crate::router::EventRouter;
use cw_adapters::{Provider, TaskStore, WorkspaceStore};
use cw_core::{Clock, Event, Workflow, WorkflowState, WorkflowStateKind, WorkspaceStatus};
use cw_storage::WorkflowStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Collaborators the engine composes over.
pub struct EngineDeps<T, W, P> {
    pub tasks: T,
    pub workspaces: W,
    pub provider: P,
}

/// Outcome of one `process` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessResult {
    /// At least one transition fired and was persisted.
    Advanced { from: WorkflowStateKind, to: WorkflowStateKind },
    /// No guard matched; nothing persisted.
    NoChange,
    /// The lock is held by another runner; skipped without waiting.
    Locked { holder: String },
    /// The workflow is terminal; nothing to do.
    Terminated(WorkflowStateKind),
    /// A store failure mid-tick. The lock is left to expire so the watchdog
    /// guarantees re-entry; idempotent side effects keep recovery safe.
    Errored(String),
}

pub struct Engine<T, W, P, C: Clock> {
    store: Arc<WorkflowStore<C>>,
    locks: Arc<LockRegistry>,
    router: Arc<EventRouter>,
    pub(crate) tasks: T,
    pub(crate) workspaces: W,
    pub(crate) provider: P,
    pub(crate) clock: C,
    pub(crate) config: EngineConfig,
    owner_id: String,
    /// Rate-limit deferrals: workflow id → earliest next processing time.
    /// In-memory only; the durable backoff floor lives on the record.
    deferrals: Mutex<HashMap<u64, i64>>,
}

impl<T, W, P, C> Engine<T, W, P, C>
where
    T: TaskStore,
    W: WorkspaceStore,
    P: Provider,
    C: Clock,
{
    pub fn new(
        store: Arc<WorkflowStore<C>>,
        locks: Arc<LockRegistry>,
        router: Arc<EventRouter>,
        deps: EngineDeps<T, W, P>,
        clock: C,
        config: EngineConfig,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            locks,
            router,
            tasks: deps.tasks,
            workspaces: deps.workspaces,
            provider: deps.provider,
            clock,
            config,
            owner_id: owner_id.into(),
            deferrals: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<WorkflowStore<C>> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<LockRegistry> {
        &self.locks
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Run one tick for `workflow_id`.
    pub async fn process(&self, workflow_id: u64, cancel: &CancellationToken) -> ProcessResult {
        let now = self.clock.epoch_secs();
        let generation =
            match self.locks.try_acquire(workflow_id, &self.owner_id, self.config.lock_ttl, now) {
                AcquireResult::Acquired { generation } => generation,
                AcquireResult::HeldBy { owner, .. } => {
                    return ProcessResult::Locked { holder: owner };
                }
            };

        let result = self.process_locked(workflow_id, cancel).await;

        // A store failure leaves the lock to expire: the watchdog then
        // guarantees re-entry and the idempotent effects keep us consistent.
        if !matches!(result, ProcessResult::Errored(_)) {
            let _ = self.locks.release(
                workflow_id,
                generation,
                ReleaseReason::Normal,
                self.clock.epoch_secs(),
            );
        }
        result
    }

    async fn process_locked(
        &self,
        workflow_id: u64,
        cancel: &CancellationToken,
    ) -> ProcessResult {
        let mut wf = match self.store.get(workflow_id) {
            Ok(wf) => wf,
            Err(e) => return ProcessResult::Errored(e.to_string()),
        };
        if wf.is_terminal() {
            return ProcessResult::Terminated(wf.state.kind());
        }

        // A loaded record with broken invariants is failed, never repaired.
        if let Err(violation) = wf.check_invariants() {
            tracing::error!(
                workflow = workflow_id,
                record = ?wf,
                error = %violation,
                "invariant violation in stored record"
            );
            let now = self.clock.epoch_secs();
            let message = violation.to_string();
            return match self.store.update(workflow_id, move |w| {
                w.record_error(message, now);
                w.state = WorkflowState::Failed;
                w.ended_at = Some(now);
            }) {
                Ok(_) => ProcessResult::Advanced {
                    from: wf.state.kind(),
                    to: WorkflowStateKind::Failed,
                },
                Err(e) => ProcessResult::Errored(e.to_string()),
            };
        }

        // Rate-limit deferral: the workflow is not eligible again until the
        // upstream-requested window has passed.
        let now = self.clock.epoch_secs();
        {
            let mut deferrals = self.deferrals.lock();
            if let Some(&until) = deferrals.get(&workflow_id) {
                if now < until {
                    return ProcessResult::NoChange;
                }
                deferrals.remove(&workflow_id);
            }
        }

        let mut events = self.router.drain(workflow_id);
        events.extend(self.synthesized_events(&wf).await);
        if events.is_empty() {
            events.push(Event::Tick);
        }

        let mut first_from: Option<WorkflowStateKind> = None;
        let mut last_to: Option<WorkflowStateKind> = None;

        for event in events {
            if cancel.is_cancelled() {
                tracing::debug!(workflow = workflow_id, "tick cancelled, stopping drain");
                break;
            }
            let event = normalize(event);
            match self.apply_event(&mut wf, event).await {
                Ok(Some((from, to))) => {
                    first_from.get_or_insert(from);
                    last_to = Some(to);
                }
                Ok(None) => {}
                Err(e) => return ProcessResult::Errored(e.to_string()),
            }
            if wf.is_terminal() || wf.state.is_retry() {
                break;
            }
        }

        match (first_from, last_to) {
            (Some(from), Some(to)) => ProcessResult::Advanced { from, to },
            _ => ProcessResult::NoChange,
        }
    }

    /// Fire at most one transition for one event.
    ///
    /// A side-effect (or guard) failure composes an `error:observed` event
    /// and re-enters the table once; a second failure rewrites the state to
    /// `Retry(current)` directly. `Err` here means the workflow store itself
    /// failed and the tick must surface `Errored`.
    async fn apply_event(
        &self,
        wf: &mut Workflow,
        event: Event,
    ) -> Result<Option<(WorkflowStateKind, WorkflowStateKind)>, EngineError> {
        let mut event = event;
        for attempt in 0..2 {
            let fired = match self.select_row(wf, &event).await {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(workflow = wf.id, error = %e, "guard evaluation failed");
                    if attempt == 0 {
                        event = error_event(&e);
                        continue;
                    }
                    return self.persist_retry(wf, &e).map(Some);
                }
            };
            let Some(row) = fired else {
                return Ok(None);
            };

            match self.run_effects(wf, &row.effects).await {
                Ok(changes) => {
                    return self.persist_transition(wf, row, changes, &event).map(Some);
                }
                Err(e) => {
                    tracing::warn!(workflow = wf.id, error = %e, "side effect failed");
                    if attempt == 0 {
                        event = error_event(&e);
                        continue;
                    }
                    return self.persist_retry(wf, &e).map(Some);
                }
            }
        }
        Ok(None)
    }

    /// First candidate row whose guard passes, if any.
    async fn select_row(&self, wf: &Workflow, event: &Event) -> Result<Option<Row>, EngineError> {
        for row in machine::candidates(&wf.state, event) {
            match self.evaluate_guard(row.guard, wf, event).await? {
                crate::guards::Verdict::Pass => return Ok(Some(row)),
                crate::guards::Verdict::Skip => continue,
                crate::guards::Verdict::Abandon => return Ok(Some(machine::abandon_row())),
            }
        }
        Ok(None)
    }

    /// Atomically persist a fired transition and its recorded associations.
    fn persist_transition(
        &self,
        wf: &mut Workflow,
        row: Row,
        changes: EffectChanges,
        event: &Event,
    ) -> Result<(WorkflowStateKind, WorkflowStateKind), EngineError> {
        let now = self.clock.epoch_secs();
        let from = wf.state.kind();
        let prev_was_retry = wf.state.is_retry();
        let next = row.next;
        let to = next.kind();
        let error_info = match event {
            Event::ErrorObserved { message, retry_after_s, .. } => {
                Some((message.clone(), *retry_after_s))
            }
            _ => None,
        };
        let event_kind = event.kind();

        let updated = self.store.update(wf.id, {
            let next = next.clone();
            let error_info = error_info.clone();
            move |w| {
                if let Some(id) = changes.task_id {
                    w.task_id = Some(id);
                }
                if let Some(id) = changes.workspace_id {
                    w.workspace_id = Some(id);
                }
                if let Some(branch) = changes.feature_branch {
                    w.feature_branch = Some(branch);
                }
                if let Some(number) = changes.pr_number {
                    w.pr_number = Some(number);
                }
                if let Some((message, _)) = &error_info {
                    w.record_error(message.clone(), now);
                }
                if next.is_retry() {
                    w.retry_count += 1;
                } else if !prev_was_retry && !next.is_terminal() && next != w.state {
                    // Real progress resets the per-transition retry budget
                    w.retry_count = 0;
                }
                if matches!(next, WorkflowState::AgentWorking) && w.started_at.is_none() {
                    w.started_at = Some(now);
                }
                if matches!(next, WorkflowState::PrChangesRequested) {
                    w.revision_count += 1;
                }
                if next.is_terminal() {
                    w.ended_at = Some(now);
                }
                w.state = next;
            }
        })?;
        *wf = updated;

        // Rate limits extend the retry backoff by the upstream-requested window
        if let Some((_, Some(retry_after))) = error_info {
            self.deferrals.lock().insert(wf.id, now + retry_after as i64);
        }

        tracing::info!(
            workflow = wf.id,
            from = %from,
            to = %to,
            event = event_kind,
            "workflow advanced"
        );
        Ok((from, to))
    }

    /// Fallback when even the error-handling pass failed: rewrite the state
    /// to `Retry(current)` with an incremented counter, nothing else.
    fn persist_retry(
        &self,
        wf: &mut Workflow,
        error: &EngineError,
    ) -> Result<(WorkflowStateKind, WorkflowStateKind), EngineError> {
        let row = Row {
            guard: crate::machine::Guard::Always,
            next: WorkflowState::Retry { prev: Box::new(wf.state.clone()) },
            effects: vec![],
        };
        let event = error_event(error);
        self.persist_transition(wf, row, EffectChanges::default(), &event)
    }

    /// Events the engine synthesizes from collaborator state it is waiting on.
    async fn synthesized_events(&self, wf: &Workflow) -> Vec<Event> {
        if wf.state != WorkflowState::WorkspaceProvisioning {
            return vec![];
        }
        let Some(workspace_id) = &wf.workspace_id else {
            return vec![];
        };
        match self.workspaces.workspace_status(workspace_id).await {
            Ok(WorkspaceStatus::Ready) => {
                vec![Event::WorkspaceReady { workspace_id: workspace_id.clone() }]
            }
            Ok(WorkspaceStatus::Failed) => vec![Event::ErrorObserved {
                message: format!("workspace {workspace_id} failed to provision"),
                permanent: false,
                retry_after_s: None,
            }],
            Ok(_) => vec![],
            Err(e) => {
                tracing::warn!(workflow = wf.id, error = %e, "workspace status check failed");
                vec![]
            }
        }
    }
}

/// The agent reporting failure is an observed error, not a transition input.
fn normalize(event: Event) -> Event {
    match event {
        Event::WorkReported { success: false, summary, .. } => Event::ErrorObserved {
            message: summary.unwrap_or_else(|| "agent reported failure".to_string()),
            permanent: false,
            retry_after_s: None,
        },
        other => other,
    }
}

/// Fold a collaborator failure into the event vocabulary.
pub(crate) fn error_event(error: &EngineError) -> Event {
    Event::ErrorObserved {
        message: error.to_string(),
        permanent: error.is_permanent(),
        retry_after_s: error.retry_after_s(),
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
