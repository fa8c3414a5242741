// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The workflow transition table.
//!
//! `candidates` is a pure, total match over (state, event): it returns the
//! rows that may fire, in evaluation order. The engine evaluates each row's
//! guard (some guards consult collaborators) and fires the first one that
//! passes. No transition fires when every guard fails; the engine re-attempts
//! on the next tick.
//!
//! Rows never perform side effects themselves; they name the effects for
//! the engine's executor, which keys every effect so repeated execution
//! across crash recovery is safe.

use cw_core::{Event, WorkflowState};

/// Guard on a transition row. Record-local guards are pure functions of the
/// workflow record and the injected clock; the rest are resolved against the
/// collaborator stores under the workflow's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Always,
    /// The upstream issue still exists and is open.
    IssueOpenUpstream,
    /// The associated task exists and is queued.
    TaskQueued,
    /// The workspace store reports the checkout ready.
    WorkspaceReady,
    /// The workspace checkout has commits to push.
    LocalCommitsAhead,
    /// The PR's review stream shows activity (comments) upstream.
    ReviewActivity,
    /// The record's wall-clock age exceeded its abandon TTL.
    AbandonExpired,
    /// The retry backoff window has elapsed.
    BackoffElapsed,
    /// The retry budget for the current state is spent.
    RetriesExhausted,
    /// The observed error is permanent (auth refusal, missing entity, 4xx).
    PermanentError,
    /// The observed error is transient and retries remain.
    RetriesRemaining,
}

/// A side effect named by a transition row, executed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// Create the task for this issue (keyed by external ticket id).
    CreateTask,
    /// Ask the workspace store for a checkout on a fresh feature branch.
    ProvisionWorkspace,
    /// Move the task to in-progress.
    MarkTaskInProgress,
    /// Move the task to in-progress and stamp its start time.
    StartTask,
    /// Push the feature branch upstream.
    PushFeatureBranch,
    /// Open the pull request (keyed by head branch).
    OpenPullRequest,
    /// Record an upstream PR that already exists for our branch.
    AdoptPullRequest { number: u64 },
    /// Reopen the task after review requested changes.
    ReopenTask,
    /// Mark the task completed.
    CompleteTask,
    /// Close the upstream issue if still open.
    CloseIssue,
    /// Cancel the task.
    CancelTask,
    /// Request deletion of the workspace checkout.
    ReleaseWorkspace,
}

/// One row of the transition table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub guard: Guard,
    pub next: WorkflowState,
    pub effects: Vec<SideEffect>,
}

impl Row {
    fn new(guard: Guard, next: WorkflowState, effects: Vec<SideEffect>) -> Self {
        Self { guard, next, effects }
    }
}

/// The row fired when a workflow exceeds its abandon TTL or its upstream
/// issue disappears.
pub fn abandon_row() -> Row {
    Row::new(
        Guard::Always,
        WorkflowState::Abandoned,
        vec![SideEffect::CancelTask, SideEffect::ReleaseWorkspace],
    )
}

/// Candidate rows for (state, event), in evaluation order.
///
/// Terminal states never appear here; the engine returns before consulting
/// the table when the record is terminal.
pub fn candidates(state: &WorkflowState, event: &Event) -> Vec<Row> {
    use Guard::*;
    use SideEffect::*;
    use WorkflowState as S;

    // Rows independent of the current state
    match event {
        Event::PrClosedWithoutMerge { .. } => {
            return vec![Row::new(Always, S::Cancelled, vec![CancelTask])];
        }
        Event::ErrorObserved { .. } => {
            return vec![
                Row::new(PermanentError, S::Failed, vec![]),
                Row::new(
                    RetriesRemaining,
                    S::Retry { prev: Box::new(state.clone()) },
                    vec![],
                ),
                Row::new(Always, S::Failed, vec![]),
            ];
        }
        _ => {}
    }

    match (state, event) {
        (S::Discovered, Event::Tick) => vec![
            Row::new(AbandonExpired, S::Abandoned, vec![CancelTask, ReleaseWorkspace]),
            Row::new(IssueOpenUpstream, S::TaskCreated, vec![CreateTask]),
        ],
        (S::TaskCreated, Event::Tick) => vec![
            Row::new(AbandonExpired, S::Abandoned, vec![CancelTask, ReleaseWorkspace]),
            Row::new(TaskQueued, S::WorkspaceProvisioning, vec![ProvisionWorkspace]),
        ],
        (S::WorkspaceProvisioning, Event::WorkspaceReady { .. }) => vec![Row::new(
            Guard::WorkspaceReady,
            S::WorkspaceReady,
            vec![MarkTaskInProgress],
        )],
        (S::WorkspaceReady, Event::Tick) => vec![
            Row::new(AbandonExpired, S::Abandoned, vec![CancelTask, ReleaseWorkspace]),
            Row::new(Always, S::AgentWorking, vec![StartTask]),
        ],
        (S::AgentWorking, Event::WorkReported { success: true, .. }) => {
            vec![Row::new(Always, S::ChangesReported, vec![])]
        }
        (S::ChangesReported, Event::Tick) => vec![
            Row::new(AbandonExpired, S::Abandoned, vec![CancelTask, ReleaseWorkspace]),
            Row::new(LocalCommitsAhead, S::BranchPushed, vec![PushFeatureBranch]),
        ],
        (S::BranchPushed, Event::Tick) => vec![
            Row::new(AbandonExpired, S::Abandoned, vec![CancelTask, ReleaseWorkspace]),
            Row::new(Always, S::PrOpen, vec![OpenPullRequest]),
        ],
        (S::BranchPushed, Event::PrCreated { number }) => {
            vec![Row::new(Always, S::PrOpen, vec![AdoptPullRequest { number: *number }])]
        }
        (S::PrOpen, Event::Tick) => vec![
            Row::new(AbandonExpired, S::Abandoned, vec![CancelTask, ReleaseWorkspace]),
            Row::new(ReviewActivity, S::PrInReview, vec![]),
        ],
        (S::PrOpen | S::PrInReview, Event::PrReviewApproved { .. }) => {
            vec![Row::new(Always, S::PrApproved, vec![])]
        }
        (S::PrOpen | S::PrInReview, Event::PrChangesRequested { .. }) => {
            vec![Row::new(Always, S::PrChangesRequested, vec![ReopenTask])]
        }
        (S::PrChangesRequested, Event::WorkReported { success: true, .. }) => {
            vec![Row::new(Always, S::ChangesReported, vec![])]
        }
        (S::PrApproved, Event::PrMerged { .. }) => {
            vec![Row::new(Always, S::PrMerged, vec![CompleteTask])]
        }
        (S::PrMerged, Event::Tick) => vec![
            Row::new(AbandonExpired, S::Abandoned, vec![CancelTask, ReleaseWorkspace]),
            Row::new(Always, S::Closed, vec![CloseIssue]),
        ],
        (S::Retry { prev }, Event::Tick) => vec![
            Row::new(AbandonExpired, S::Abandoned, vec![CancelTask, ReleaseWorkspace]),
            Row::new(RetriesExhausted, S::Failed, vec![]),
            Row::new(BackoffElapsed, (**prev).clone(), vec![]),
        ],
        // Every other non-terminal state still honours the abandon TTL on a
        // tick, and otherwise waits.
        (_, Event::Tick) => {
            vec![Row::new(AbandonExpired, S::Abandoned, vec![CancelTask, ReleaseWorkspace])]
        }
        _ => vec![],
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
