// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Side-effect executor.
//!
//! Every effect is keyed so repeated execution across crash recovery is
//! safe: task creation looks up the external ticket id first, PR creation
//! looks up the head branch first, deletions tolerate `NotFound`. Effects
//! report the associations they established; the engine folds those into
//! the same atomic store write as the state change.

use crate::engine::Engine;
use crate::error::EngineError;
use crate::machine::SideEffect;
use cw_adapters::{
    NewPullRequest, Provider, ProviderError, TaskStore, TaskStoreError, WorkspaceStore,
    WorkspaceStoreError,
};
use cw_core::{
    Clock, NewTask, NewWorkspace, TaskId, TaskPatch, TaskPriority, TaskStatus, Workflow,
    WorkspaceId,
};

/// Associations established by a batch of side effects.
#[derive(Debug, Default)]
pub(crate) struct EffectChanges {
    pub task_id: Option<TaskId>,
    pub workspace_id: Option<WorkspaceId>,
    pub feature_branch: Option<String>,
    pub pr_number: Option<u64>,
}

impl<T, W, P, C> Engine<T, W, P, C>
where
    T: TaskStore,
    W: WorkspaceStore,
    P: Provider,
    C: Clock,
{
    pub(crate) async fn run_effects(
        &self,
        wf: &Workflow,
        effects: &[SideEffect],
    ) -> Result<EffectChanges, EngineError> {
        let mut changes = EffectChanges::default();
        for effect in effects {
            let start = std::time::Instant::now();
            let result = self.run_effect(wf, effect, &mut changes).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(()) => {
                    tracing::info!(workflow = wf.id, effect = ?effect, elapsed_ms, "effect done");
                }
                Err(e) => {
                    tracing::error!(workflow = wf.id, effect = ?effect, elapsed_ms, error = %e, "effect failed");
                }
            }
            result?;
        }
        Ok(changes)
    }

    async fn run_effect(
        &self,
        wf: &Workflow,
        effect: &SideEffect,
        changes: &mut EffectChanges,
    ) -> Result<(), EngineError> {
        match effect {
            SideEffect::CreateTask => self.create_task(wf, changes).await,
            SideEffect::ProvisionWorkspace => self.provision_workspace(wf, changes).await,
            SideEffect::MarkTaskInProgress => {
                self.patch_task(wf, TaskPatch::status(TaskStatus::InProgress)).await
            }
            SideEffect::StartTask => {
                let patch = TaskPatch {
                    status: Some(TaskStatus::InProgress),
                    started_at: Some(self.clock.epoch_secs()),
                    ..TaskPatch::default()
                };
                self.patch_task(wf, patch).await
            }
            SideEffect::PushFeatureBranch => self.push_feature_branch(wf).await,
            SideEffect::OpenPullRequest => self.open_pull_request(wf, changes).await,
            SideEffect::AdoptPullRequest { number } => {
                changes.pr_number = Some(*number);
                Ok(())
            }
            SideEffect::ReopenTask => {
                self.patch_task(wf, TaskPatch::status(TaskStatus::InProgress)).await
            }
            SideEffect::CompleteTask => {
                let patch = TaskPatch {
                    status: Some(TaskStatus::Completed),
                    completed_at: Some(self.clock.epoch_secs()),
                    ..TaskPatch::default()
                };
                self.patch_task(wf, patch).await
            }
            SideEffect::CloseIssue => self.close_issue(wf).await,
            SideEffect::CancelTask => self.cancel_task(wf).await,
            SideEffect::ReleaseWorkspace => self.release_workspace(wf).await,
        }
    }

    /// Keyed by external ticket id: an existing task is adopted, not duplicated.
    async fn create_task(
        &self,
        wf: &Workflow,
        changes: &mut EffectChanges,
    ) -> Result<(), EngineError> {
        let ticket = wf.ticket().to_string();
        if let Some(task) = self.tasks.find_by_external_id(&ticket).await? {
            changes.task_id = Some(task.id);
            return Ok(());
        }
        let issue = self.provider.get_issue(&wf.owner, &wf.repo, wf.issue_number).await?;
        let task = self
            .tasks
            .create_task(NewTask {
                name: issue.title,
                description: issue.body,
                external_ticket_id: ticket,
                priority: TaskPriority::Normal,
            })
            .await?;
        // Mark the issue as tracked so the operator sees it was picked up
        let label = format!("{}:queued", self.config.branch_prefix);
        self.provider
            .set_issue_labels(&wf.owner, &wf.repo, wf.issue_number, &[label])
            .await?;
        changes.task_id = Some(task.id);
        Ok(())
    }

    /// Keyed by the workflow's recorded workspace id: provisioning is only
    /// requested once.
    async fn provision_workspace(
        &self,
        wf: &Workflow,
        changes: &mut EffectChanges,
    ) -> Result<(), EngineError> {
        if wf.workspace_id.is_some() {
            return Ok(());
        }
        let task_id = wf
            .task_id
            .clone()
            .ok_or_else(|| EngineError::Inconsistent(format!("workflow {} has no task", wf.id)))?;
        let branch = wf
            .feature_branch
            .clone()
            .unwrap_or_else(|| {
                format!("{}/issue-{}", self.config.branch_prefix, wf.issue_number)
            });
        let workspace = self
            .workspaces
            .create_workspace(NewWorkspace {
                task_id: task_id.clone(),
                source_repo: format!("{}/{}", wf.owner, wf.repo),
                base_branch: wf.base_branch.clone(),
                feature_branch: branch.clone(),
            })
            .await?;
        let patch = TaskPatch { workspace_id: Some(workspace.id.clone()), ..TaskPatch::default() };
        self.tasks.update_task(&task_id, patch).await?;
        changes.workspace_id = Some(workspace.id);
        changes.feature_branch = Some(branch);
        Ok(())
    }

    async fn push_feature_branch(&self, wf: &Workflow) -> Result<(), EngineError> {
        let workspace_id = wf.workspace_id.clone().ok_or_else(|| {
            EngineError::Inconsistent(format!("workflow {} has no workspace", wf.id))
        })?;
        let branch = wf.feature_branch.clone().ok_or_else(|| {
            EngineError::Inconsistent(format!("workflow {} has no feature branch", wf.id))
        })?;
        let workspace = self.workspaces.get_workspace(&workspace_id).await?;
        self.provider.push_branch(&workspace.path, &branch).await?;
        Ok(())
    }

    /// Keyed by head branch: a PR that already exists upstream (e.g. opened
    /// just before a crash) is adopted instead of duplicated.
    async fn open_pull_request(
        &self,
        wf: &Workflow,
        changes: &mut EffectChanges,
    ) -> Result<(), EngineError> {
        if let Some(number) = wf.pr_number {
            changes.pr_number = Some(number);
            return Ok(());
        }
        let head = wf.feature_branch.clone().ok_or_else(|| {
            EngineError::Inconsistent(format!("workflow {} has no feature branch", wf.id))
        })?;
        match self.provider.find_pull_request_by_head(&wf.owner, &wf.repo, &head).await {
            Ok(existing) => {
                changes.pr_number = Some(existing.number);
                return Ok(());
            }
            Err(ProviderError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        let title = match &wf.task_id {
            Some(task_id) => match self.tasks.get_task(task_id).await {
                Ok(task) => task.name,
                Err(TaskStoreError::NotFound(_)) => format!("Fix issue #{}", wf.issue_number),
                Err(e) => return Err(e.into()),
            },
            None => format!("Fix issue #{}", wf.issue_number),
        };
        let pr = self
            .provider
            .open_pull_request(NewPullRequest {
                owner: wf.owner.clone(),
                repo: wf.repo.clone(),
                head,
                base: wf.base_branch.clone(),
                title,
                body: format!("Closes #{}", wf.issue_number),
            })
            .await?;
        changes.pr_number = Some(pr.number);
        Ok(())
    }

    /// Skips silently when the issue is already gone or closed upstream.
    async fn close_issue(&self, wf: &Workflow) -> Result<(), EngineError> {
        match self.provider.close_issue(&wf.owner, &wf.repo, wf.issue_number).await {
            Ok(()) | Err(ProviderError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn cancel_task(&self, wf: &Workflow) -> Result<(), EngineError> {
        let Some(task_id) = &wf.task_id else { return Ok(()) };
        match self.tasks.get_task(task_id).await {
            Ok(task) if !task.status.is_terminal() => {
                self.tasks
                    .update_task(task_id, TaskPatch::status(TaskStatus::Cancelled))
                    .await?;
                Ok(())
            }
            Ok(_) | Err(TaskStoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn release_workspace(&self, wf: &Workflow) -> Result<(), EngineError> {
        let Some(workspace_id) = &wf.workspace_id else { return Ok(()) };
        match self.workspaces.delete_workspace(workspace_id).await {
            Ok(()) | Err(WorkspaceStoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_task(&self, wf: &Workflow, patch: TaskPatch) -> Result<(), EngineError> {
        let Some(task_id) = &wf.task_id else {
            return Err(EngineError::Inconsistent(format!("workflow {} has no task", wf.id)));
        };
        self.tasks.update_task(task_id, patch).await?;
        Ok(())
    }
}
