// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory workspace store.

use crate::workspace_store::{WorkspaceStore, WorkspaceStoreError};
use async_trait::async_trait;
use cw_core::{NewWorkspace, Workspace, WorkspaceId, WorkspaceStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Default)]
struct State {
    workspaces: HashMap<WorkspaceId, Workspace>,
    deleted: Vec<WorkspaceId>,
    created: u32,
}

/// In-memory [`WorkspaceStore`].
///
/// With `auto_ready` (the default) created workspaces are immediately
/// `Ready`; otherwise they stay `Provisioning` until [`mark_ready`] is
/// called, which exercises the engine's provisioning wait.
///
/// [`mark_ready`]: InMemoryWorkspaceStore::mark_ready
#[derive(Clone)]
pub struct InMemoryWorkspaceStore {
    state: Arc<Mutex<State>>,
    auto_ready: bool,
}

impl Default for InMemoryWorkspaceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWorkspaceStore {
    pub fn new() -> Self {
        Self { state: Arc::new(Mutex::new(State::default())), auto_ready: true }
    }

    pub fn manual_ready() -> Self {
        Self { state: Arc::new(Mutex::new(State::default())), auto_ready: false }
    }

    pub fn mark_ready(&self, id: &WorkspaceId) {
        if let Some(ws) = self.state.lock().workspaces.get_mut(id) {
            ws.status = WorkspaceStatus::Ready;
        }
    }

    pub fn mark_failed(&self, id: &WorkspaceId) {
        if let Some(ws) = self.state.lock().workspaces.get_mut(id) {
            ws.status = WorkspaceStatus::Failed;
        }
    }

    pub fn created_count(&self) -> u32 {
        self.state.lock().created
    }

    pub fn deleted(&self) -> Vec<WorkspaceId> {
        self.state.lock().deleted.clone()
    }
}

#[async_trait]
impl WorkspaceStore for InMemoryWorkspaceStore {
    async fn create_workspace(
        &self,
        new: NewWorkspace,
    ) -> Result<Workspace, WorkspaceStoreError> {
        let id = WorkspaceId::generate();
        let workspace = Workspace {
            path: PathBuf::from(format!("/tmp/workspaces/{}", id.suffix())),
            id: id.clone(),
            branch: new.feature_branch,
            base_branch: new.base_branch,
            source_repo: new.source_repo,
            status: if self.auto_ready {
                WorkspaceStatus::Ready
            } else {
                WorkspaceStatus::Provisioning
            },
        };
        let mut state = self.state.lock();
        state.created += 1;
        state.workspaces.insert(id, workspace.clone());
        Ok(workspace)
    }

    async fn get_workspace(&self, id: &WorkspaceId) -> Result<Workspace, WorkspaceStoreError> {
        self.state
            .lock()
            .workspaces
            .get(id)
            .cloned()
            .ok_or_else(|| WorkspaceStoreError::NotFound(id.clone()))
    }

    async fn delete_workspace(&self, id: &WorkspaceId) -> Result<(), WorkspaceStoreError> {
        let mut state = self.state.lock();
        if state.workspaces.remove(id).is_none() {
            return Err(WorkspaceStoreError::NotFound(id.clone()));
        }
        state.deleted.push(id.clone());
        Ok(())
    }

    async fn workspace_status(
        &self,
        id: &WorkspaceId,
    ) -> Result<WorkspaceStatus, WorkspaceStoreError> {
        self.state
            .lock()
            .workspaces
            .get(id)
            .map(|ws| ws.status)
            .ok_or_else(|| WorkspaceStoreError::NotFound(id.clone()))
    }
}
