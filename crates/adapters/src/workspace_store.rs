// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace store contract (consumed).
//!
//! The workspace store owns the isolated on-disk checkouts and their
//! metadata. Provisioning is asynchronous: a created workspace starts in
//! `Provisioning` and the engine polls `workspace_status` until `Ready`.

use async_trait::async_trait;
use cw_core::{NewWorkspace, Workspace, WorkspaceId, WorkspaceStatus};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum WorkspaceStoreError {
    #[error("workspace {0} not found")]
    NotFound(WorkspaceId),
    #[error("workspace store error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait WorkspaceStore: Clone + Send + Sync + 'static {
    async fn create_workspace(&self, new: NewWorkspace) -> Result<Workspace, WorkspaceStoreError>;

    async fn get_workspace(&self, id: &WorkspaceId) -> Result<Workspace, WorkspaceStoreError>;

    async fn delete_workspace(&self, id: &WorkspaceId) -> Result<(), WorkspaceStoreError>;

    async fn workspace_status(&self, id: &WorkspaceId)
        -> Result<WorkspaceStatus, WorkspaceStoreError>;
}
