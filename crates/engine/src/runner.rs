// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Poller / runner: discovers workflows needing work and dispatches ticks.
//!
//! Each poll routes fresh provider events to per-workflow queues, turns
//! unseen issues into new workflows, and dispatches engine ticks on a
//! bounded worker set. Parallelism is across distinct workflow ids only;
//! same-id exclusion is the lock registry's job.

use crate::engine::{Engine, ProcessResult};
use cw_adapters::{EventSource, Provider, TaskStore, WorkspaceStore};
use cw_core::{Clock, Event, ProviderKind, WorkflowSpec};
use cw_storage::WorkflowFilter;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Project coordinates one runner is responsible for.
#[derive(Debug, Clone)]
pub struct Project {
    pub provider: ProviderKind,
    pub owner: String,
    pub repo: String,
    pub base_branch: String,
}

pub struct Runner<T, W, P, C, E>
where
    C: Clock,
{
    engine: Arc<Engine<T, W, P, C>>,
    source: Arc<E>,
    project: Project,
    clock: C,
    last_poll: Mutex<i64>,
}

impl<T, W, P, C, E> Runner<T, W, P, C, E>
where
    T: TaskStore,
    W: WorkspaceStore,
    P: Provider,
    C: Clock,
    E: EventSource,
{
    pub fn new(engine: Arc<Engine<T, W, P, C>>, source: Arc<E>, project: Project, clock: C) -> Self {
        Self { engine, source, project, clock, last_poll: Mutex::new(0) }
    }

    /// Continuous mode: poll every `poll_interval` until cancelled, then
    /// force-release any locks this runner still owns.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            owner = %self.project.owner,
            repo = %self.project.repo,
            "runner started"
        );
        loop {
            self.run_once(&cancel).await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.engine.config().poll_interval) => {}
            }
        }
        let released =
            self.engine.locks().release_owned(self.engine.owner_id(), self.clock.epoch_secs());
        if !released.is_empty() {
            tracing::warn!(count = released.len(), "released own locks on shutdown");
        }
        tracing::info!("runner stopped");
    }

    /// One-shot mode: route events, then process all eligible workflows once.
    pub async fn run_once(&self, cancel: &CancellationToken) {
        self.poll_events().await;
        self.dispatch(cancel).await;
    }

    /// Pull fresh events from the source and route them to workflow queues.
    async fn poll_events(&self) {
        let since = *self.last_poll.lock();
        let polled =
            self.source.poll(&self.project.owner, &self.project.repo, since).await;
        let events = match polled {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(error = %e, "event poll failed, retrying next cycle");
                return;
            }
        };
        *self.last_poll.lock() = self.clock.epoch_secs();

        let router = self.engine.router();
        for event in events {
            let target = match &event {
                Event::IssueAppeared { provider, owner, repo, number, .. } => {
                    self.discover(*provider, owner, repo, *number);
                    None
                }
                Event::WorkReported { workflow_id, .. } => Some(*workflow_id),
                other => match other.pr_number() {
                    Some(number) => {
                        let found = self.engine.store().find_by_pr(
                            &self.project.owner,
                            &self.project.repo,
                            number,
                        );
                        if found.is_none() {
                            tracing::debug!(pr = number, "event for unknown PR dropped");
                        }
                        found.map(|wf| wf.id)
                    }
                    None => None,
                },
            };
            if let Some(workflow_id) = target {
                router.push(workflow_id, event);
            }
        }

        // Keep the source watching every live PR and drop finished ones
        for wf in self.engine.store().list(&WorkflowFilter::default()) {
            if let Some(number) = wf.pr_number {
                if wf.is_terminal() {
                    self.source.untrack_pr(number);
                } else {
                    self.source.track_pr(number);
                }
            }
        }
    }

    /// Create a workflow for an issue that has none yet (one per issue).
    fn discover(&self, provider: ProviderKind, owner: &str, repo: &str, number: u64) {
        let store = self.engine.store();
        if store.find_by_issue(provider, owner, repo, number).is_some() {
            return;
        }
        let spec = WorkflowSpec::new(provider, owner, repo, number)
            .base_branch(self.project.base_branch.clone())
            .config(self.engine.config().workflow_config());
        match store.create(spec) {
            Ok(wf) => {
                tracing::info!(workflow = wf.id, issue = number, "workflow discovered");
                self.engine.router().push(wf.id, Event::Tick);
            }
            Err(e) => tracing::error!(issue = number, error = %e, "workflow create failed"),
        }
    }

    /// Dispatch engine ticks for eligible workflows, bounded by
    /// `max_concurrent_workflows`; the rest wait for the next poll.
    async fn dispatch(&self, cancel: &CancellationToken) {
        let now = self.clock.epoch_secs();
        let held: HashSet<u64> = self
            .engine
            .locks()
            .list_locks()
            .into_iter()
            .filter(|lock| !lock.is_expired(now))
            .map(|lock| lock.workflow_id)
            .collect();

        let filter = WorkflowFilter {
            owner: Some(self.project.owner.clone()),
            repo: Some(self.project.repo.clone()),
            non_terminal_only: true,
            ..WorkflowFilter::default()
        };
        let mut candidates: Vec<u64> = self
            .engine
            .store()
            .list(&filter)
            .into_iter()
            .map(|wf| wf.id)
            .filter(|id| !held.contains(id))
            .collect();
        // Workflows with pending events take slots first so a small cap
        // cannot starve them behind idle low-id workflows.
        let router = self.engine.router();
        candidates
            .sort_by_key(|id| (std::cmp::Reverse(router.pending(*id).min(1)), *id));
        candidates.truncate(self.engine.config().max_concurrent_workflows);

        let mut ticks: JoinSet<(u64, ProcessResult)> = JoinSet::new();
        for id in candidates {
            if cancel.is_cancelled() {
                break;
            }
            let engine = Arc::clone(&self.engine);
            let cancel = cancel.clone();
            ticks.spawn(async move { (id, engine.process(id, &cancel).await) });
        }

        // On cancel, give in-flight ticks the grace period, then abort.
        let grace = self.engine.config().shutdown_grace;
        while !ticks.is_empty() {
            let joined = if cancel.is_cancelled() {
                match tokio::time::timeout(grace, ticks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        tracing::warn!(in_flight = ticks.len(), "grace expired, aborting ticks");
                        ticks.abort_all();
                        break;
                    }
                }
            } else {
                ticks.join_next().await
            };
            match joined {
                Some(Ok((id, result))) => log_result(id, &result),
                Some(Err(e)) => tracing::error!(error = %e, "tick task panicked"),
                None => break,
            }
        }
    }
}

fn log_result(workflow_id: u64, result: &ProcessResult) {
    match result {
        ProcessResult::Advanced { from, to } => {
            tracing::debug!(workflow = workflow_id, %from, %to, "tick advanced");
        }
        ProcessResult::NoChange => {}
        ProcessResult::Locked { holder } => {
            tracing::debug!(workflow = workflow_id, holder = %holder, "tick skipped, locked");
        }
        ProcessResult::Terminated(state) => {
            tracing::debug!(workflow = workflow_id, %state, "workflow terminal");
        }
        ProcessResult::Errored(error) => {
            tracing::error!(workflow = workflow_id, error = %error, "tick errored");
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
