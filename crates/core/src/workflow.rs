// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow record and state machine vocabulary.
//!
//! A workflow tracks one upstream issue from discovery to a merged pull
//! request. Records are owned by the workflow store and only mutated by the
//! engine while it holds the workflow's lock.

use crate::clock::Clock;
use crate::task::TaskId;
use crate::ticket::{ProviderKind, TicketRef};
use crate::workspace::WorkspaceId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle state of a workflow.
///
/// `Retry` is a recovery pseudo-state holding the state to re-enter after
/// exponential backoff. Terminal states are `Closed`, `Cancelled`, `Failed`,
/// and `Abandoned`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum WorkflowState {
    Discovered,
    TaskCreated,
    WorkspaceProvisioning,
    WorkspaceReady,
    AgentWorking,
    ChangesReported,
    BranchPushed,
    PrOpen,
    PrInReview,
    PrChangesRequested,
    PrApproved,
    PrMerged,
    Closed,
    Cancelled,
    Failed,
    Abandoned,
    Retry { prev: Box<WorkflowState> },
}

impl WorkflowState {
    /// Check if no further transition is possible from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Closed
                | WorkflowState::Cancelled
                | WorkflowState::Failed
                | WorkflowState::Abandoned
        )
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, WorkflowState::Retry { .. })
    }

    pub fn kind(&self) -> WorkflowStateKind {
        self.into()
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Retry { prev } => write!(f, "retry({prev})"),
            other => f.write_str(match other {
                WorkflowState::Discovered => "discovered",
                WorkflowState::TaskCreated => "task_created",
                WorkflowState::WorkspaceProvisioning => "workspace_provisioning",
                WorkflowState::WorkspaceReady => "workspace_ready",
                WorkflowState::AgentWorking => "agent_working",
                WorkflowState::ChangesReported => "changes_reported",
                WorkflowState::BranchPushed => "branch_pushed",
                WorkflowState::PrOpen => "pr_open",
                WorkflowState::PrInReview => "pr_in_review",
                WorkflowState::PrChangesRequested => "pr_changes_requested",
                WorkflowState::PrApproved => "pr_approved",
                WorkflowState::PrMerged => "pr_merged",
                WorkflowState::Closed => "closed",
                WorkflowState::Cancelled => "cancelled",
                WorkflowState::Failed => "failed",
                WorkflowState::Abandoned => "abandoned",
                WorkflowState::Retry { .. } => "retry",
            }),
        }
    }
}

/// Tag-only variant of [`WorkflowState`] for filters and DTOs (strips the
/// retry payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStateKind {
    Discovered,
    TaskCreated,
    WorkspaceProvisioning,
    WorkspaceReady,
    AgentWorking,
    ChangesReported,
    BranchPushed,
    PrOpen,
    PrInReview,
    PrChangesRequested,
    PrApproved,
    PrMerged,
    Closed,
    Cancelled,
    Failed,
    Abandoned,
    Retry,
}

impl From<&WorkflowState> for WorkflowStateKind {
    fn from(s: &WorkflowState) -> Self {
        match s {
            WorkflowState::Discovered => WorkflowStateKind::Discovered,
            WorkflowState::TaskCreated => WorkflowStateKind::TaskCreated,
            WorkflowState::WorkspaceProvisioning => WorkflowStateKind::WorkspaceProvisioning,
            WorkflowState::WorkspaceReady => WorkflowStateKind::WorkspaceReady,
            WorkflowState::AgentWorking => WorkflowStateKind::AgentWorking,
            WorkflowState::ChangesReported => WorkflowStateKind::ChangesReported,
            WorkflowState::BranchPushed => WorkflowStateKind::BranchPushed,
            WorkflowState::PrOpen => WorkflowStateKind::PrOpen,
            WorkflowState::PrInReview => WorkflowStateKind::PrInReview,
            WorkflowState::PrChangesRequested => WorkflowStateKind::PrChangesRequested,
            WorkflowState::PrApproved => WorkflowStateKind::PrApproved,
            WorkflowState::PrMerged => WorkflowStateKind::PrMerged,
            WorkflowState::Closed => WorkflowStateKind::Closed,
            WorkflowState::Cancelled => WorkflowStateKind::Cancelled,
            WorkflowState::Failed => WorkflowStateKind::Failed,
            WorkflowState::Abandoned => WorkflowStateKind::Abandoned,
            WorkflowState::Retry { .. } => WorkflowStateKind::Retry,
        }
    }
}

crate::simple_display! {
    WorkflowStateKind {
        Discovered => "discovered",
        TaskCreated => "task_created",
        WorkspaceProvisioning => "workspace_provisioning",
        WorkspaceReady => "workspace_ready",
        AgentWorking => "agent_working",
        ChangesReported => "changes_reported",
        BranchPushed => "branch_pushed",
        PrOpen => "pr_open",
        PrInReview => "pr_in_review",
        PrChangesRequested => "pr_changes_requested",
        PrApproved => "pr_approved",
        PrMerged => "pr_merged",
        Closed => "closed",
        Cancelled => "cancelled",
        Failed => "failed",
        Abandoned => "abandoned",
        Retry => "retry",
    }
}

/// Per-workflow configuration snapshot, taken at creation time.
///
/// Field names are part of the on-disk record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub poll_interval_s: u64,
    pub lock_ttl_s: u64,
    pub max_retries: u32,
    pub abandon_ttl_s: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            poll_interval_s: 30,
            lock_ttl_s: 300,
            max_retries: 5,
            abandon_ttl_s: 14 * 24 * 60 * 60,
        }
    }
}

/// Inputs for creating a new workflow record (id is allocated by the store).
#[derive(Debug, Clone)]
pub struct WorkflowSpec {
    pub owner: String,
    pub repo: String,
    pub issue_number: u64,
    pub provider: ProviderKind,
    pub base_branch: String,
    pub task_id: Option<TaskId>,
    pub config: WorkflowConfig,
}

impl WorkflowSpec {
    pub fn new(
        provider: ProviderKind,
        owner: impl Into<String>,
        repo: impl Into<String>,
        issue_number: u64,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            issue_number,
            provider,
            base_branch: "main".to_string(),
            task_id: None,
            config: WorkflowConfig::default(),
        }
    }

    crate::setters! {
        into {
            base_branch: String,
        }
        set {
            config: WorkflowConfig,
        }
        option {
            task_id: TaskId,
        }
    }
}

/// A broken record-level invariant, detected on store mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("terminal state {state} without ended_at")]
    TerminalWithoutEnd { state: WorkflowStateKind },
    #[error("pr_number set without feature_branch")]
    PrWithoutBranch,
    #[error("pr_number set without workspace_id")]
    PrWithoutWorkspace,
    #[error("updated_at {updated_at} precedes created_at {created_at}")]
    UpdatedBeforeCreated { updated_at: i64, created_at: i64 },
}

/// The unit of work tracked by the engine; one per upstream issue.
///
/// Serialized field names are compatibility-critical; additions carry
/// `#[serde(default)]` so older records keep deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    /// Monotonic integer, unique per project.
    pub id: u64,
    pub owner: String,
    pub repo: String,
    pub issue_number: u64,
    pub provider: ProviderKind,
    pub base_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<WorkspaceId>,
    pub state: WorkflowState,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<i64>,
    pub error_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<i64>,
    pub retry_count: u32,
    /// How many times the PR went through a changes-requested → re-report loop.
    #[serde(default)]
    pub revision_count: u32,
    pub config: WorkflowConfig,
}

impl Workflow {
    /// Create a new workflow in `Discovered` with a store-allocated id.
    pub fn new(id: u64, spec: WorkflowSpec, clock: &impl Clock) -> Self {
        Self::new_at(id, spec, clock.epoch_secs())
    }

    /// Create a new workflow with an explicit creation timestamp (for replay).
    pub fn new_at(id: u64, spec: WorkflowSpec, epoch_secs: i64) -> Self {
        Self {
            id,
            config: spec.config,
            owner: spec.owner,
            repo: spec.repo,
            issue_number: spec.issue_number,
            provider: spec.provider,
            base_branch: spec.base_branch,
            feature_branch: None,
            pr_number: None,
            task_id: spec.task_id,
            workspace_id: None,
            state: WorkflowState::Discovered,
            created_at: epoch_secs,
            updated_at: epoch_secs,
            started_at: None,
            ended_at: None,
            error_count: 0,
            last_error: None,
            last_error_at: None,
            retry_count: 0,
            revision_count: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// The canonical external ticket id for this workflow's upstream issue.
    pub fn ticket(&self) -> TicketRef {
        TicketRef::new(self.provider, self.owner.clone(), self.repo.clone(), self.issue_number)
    }

    /// Record an observed error on the telemetry fields.
    pub fn record_error(&mut self, message: impl Into<String>, epoch_secs: i64) {
        self.error_count += 1;
        self.last_error = Some(message.into());
        self.last_error_at = Some(epoch_secs);
    }

    /// True once the record's wall-clock age exceeds the abandon TTL.
    pub fn abandon_expired(&self, epoch_secs: i64) -> bool {
        epoch_secs > self.created_at + self.config.abandon_ttl_s as i64
    }

    /// Check the record-local invariants.
    ///
    /// The cross-store invariant (`task_id` refers to a live task) cannot be
    /// checked here; the engine's check-then-act discipline covers it.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.state.is_terminal() && self.ended_at.is_none() {
            return Err(InvariantViolation::TerminalWithoutEnd { state: self.state.kind() });
        }
        if self.pr_number.is_some() {
            if self.feature_branch.is_none() {
                return Err(InvariantViolation::PrWithoutBranch);
            }
            if self.workspace_id.is_none() {
                return Err(InvariantViolation::PrWithoutWorkspace);
            }
        }
        if self.updated_at < self.created_at {
            return Err(InvariantViolation::UpdatedBeforeCreated {
                updated_at: self.updated_at,
                created_at: self.created_at,
            });
        }
        Ok(())
    }
}

crate::builder! {
    pub struct WorkflowBuilder => Workflow {
        into {
            owner: String = "acme",
            repo: String = "widget",
            base_branch: String = "main",
        }
        set {
            id: u64 = 1,
            issue_number: u64 = 42,
            provider: ProviderKind = ProviderKind::Github,
            state: WorkflowState = WorkflowState::Discovered,
            created_at: i64 = 1_000_000,
            updated_at: i64 = 1_000_000,
            error_count: u32 = 0,
            retry_count: u32 = 0,
            revision_count: u32 = 0,
            config: WorkflowConfig = WorkflowConfig::default(),
        }
        option {
            feature_branch: String = None,
            pr_number: u64 = None,
            task_id: TaskId = None,
            workspace_id: WorkspaceId = None,
            started_at: i64 = None,
            ended_at: i64 = None,
            last_error: String = None,
            last_error_at: i64 = None,
        }
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
