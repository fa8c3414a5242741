// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace entity, as consumed from the workspace store contract.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for an isolated on-disk checkout.
    pub struct WorkspaceId("wks-");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    Provisioning,
    Ready,
    Active,
    Failed,
}

crate::simple_display! {
    WorkspaceStatus {
        Provisioning => "provisioning",
        Ready => "ready",
        Active => "active",
        Failed => "failed",
    }
}

/// An isolated checkout on a dedicated feature branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub path: PathBuf,
    pub branch: String,
    pub base_branch: String,
    pub source_repo: String,
    pub status: WorkspaceStatus,
}

/// Inputs for `create_workspace`.
#[derive(Debug, Clone)]
pub struct NewWorkspace {
    pub task_id: TaskId,
    pub source_repo: String,
    pub base_branch: String,
    pub feature_branch: String,
}
