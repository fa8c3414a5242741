// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Guard evaluation.
//!
//! Record-local guards read only the workflow record and the injected
//! clock. External guards consult the collaborator stores; they run under
//! the workflow's lock, and a collaborator failure here follows the same
//! error:observed path as a failed side effect.

use crate::engine::Engine;
use crate::error::EngineError;
use crate::machine::Guard;
use cw_adapters::{Provider, ProviderError, TaskStore, TaskStoreError, WorkspaceStore};
use cw_core::{Clock, Event, TaskStatus, Workflow, WorkspaceStatus};

/// Outcome of evaluating one guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// Guard holds; the row fires.
    Pass,
    /// Guard fails; try the next candidate row.
    Skip,
    /// The upstream issue is gone; the workflow is abandoned instead.
    Abandon,
}

impl<T, W, P, C> Engine<T, W, P, C>
where
    T: TaskStore,
    W: WorkspaceStore,
    P: Provider,
    C: Clock,
{
    pub(crate) async fn evaluate_guard(
        &self,
        guard: Guard,
        wf: &Workflow,
        event: &Event,
    ) -> Result<Verdict, EngineError> {
        let now = self.clock.epoch_secs();
        let verdict = match guard {
            Guard::Always => Verdict::Pass,

            Guard::IssueOpenUpstream => {
                match self.provider.get_issue(&wf.owner, &wf.repo, wf.issue_number).await {
                    Ok(_) => Verdict::Pass,
                    Err(ProviderError::NotFound) => Verdict::Abandon,
                    Err(e) => return Err(e.into()),
                }
            }

            Guard::TaskQueued => {
                let Some(task_id) = &wf.task_id else { return Ok(Verdict::Skip) };
                match self.tasks.get_task(task_id).await {
                    Ok(task) if task.status == TaskStatus::Queued => Verdict::Pass,
                    Ok(_) => Verdict::Skip,
                    Err(TaskStoreError::NotFound(_)) => Verdict::Skip,
                    Err(e) => return Err(e.into()),
                }
            }

            Guard::WorkspaceReady => {
                let Some(workspace_id) = &wf.workspace_id else { return Ok(Verdict::Skip) };
                match self.workspaces.workspace_status(workspace_id).await {
                    Ok(WorkspaceStatus::Ready) => Verdict::Pass,
                    Ok(_) => Verdict::Skip,
                    Err(e) => return Err(e.into()),
                }
            }

            // The checkout is pushable while the workspace store still holds
            // it live (the agent's reported changes live there).
            Guard::LocalCommitsAhead => {
                let Some(workspace_id) = &wf.workspace_id else { return Ok(Verdict::Skip) };
                match self.workspaces.workspace_status(workspace_id).await {
                    Ok(WorkspaceStatus::Ready | WorkspaceStatus::Active) => Verdict::Pass,
                    Ok(_) => Verdict::Skip,
                    Err(e) => return Err(e.into()),
                }
            }

            Guard::ReviewActivity => {
                let Some(pr) = wf.pr_number else { return Ok(Verdict::Skip) };
                let events =
                    self.provider.pull_request_events(&wf.owner, &wf.repo, pr, 0).await?;
                if events.is_empty() {
                    Verdict::Skip
                } else {
                    Verdict::Pass
                }
            }

            Guard::AbandonExpired => {
                if wf.abandon_expired(now) {
                    Verdict::Pass
                } else {
                    Verdict::Skip
                }
            }

            Guard::BackoffElapsed => {
                let Some(errored_at) = wf.last_error_at else { return Ok(Verdict::Pass) };
                let backoff = self.config.retry_backoff(wf.retry_count);
                if now >= errored_at + backoff.as_secs() as i64 {
                    Verdict::Pass
                } else {
                    Verdict::Skip
                }
            }

            Guard::RetriesExhausted => {
                if wf.retry_count >= wf.config.max_retries {
                    Verdict::Pass
                } else {
                    Verdict::Skip
                }
            }

            Guard::PermanentError => match event {
                Event::ErrorObserved { permanent: true, .. } => Verdict::Pass,
                _ => Verdict::Skip,
            },

            Guard::RetriesRemaining => {
                if wf.retry_count < wf.config.max_retries {
                    Verdict::Pass
                } else {
                    Verdict::Skip
                }
            }
        };
        Ok(verdict)
    }
}
