// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task store contract (consumed).
//!
//! The task store owns the durable ordered record of work items. The engine
//! creates tasks for discovered issues and requests status changes; it never
//! mutates task internals directly.

use async_trait::async_trait;
use cw_core::{NewTask, Task, TaskFilter, TaskId, TaskPatch};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TaskStoreError {
    #[error("task {0} not found")]
    NotFound(TaskId),
    #[error("task store error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait TaskStore: Clone + Send + Sync + 'static {
    async fn create_task(&self, new: NewTask) -> Result<Task, TaskStoreError>;

    async fn get_task(&self, id: &TaskId) -> Result<Task, TaskStoreError>;

    /// Look up a task by its external ticket id (`<provider>:<owner>/<repo>#<n>`).
    ///
    /// This is the idempotence key for task creation: `Ok(None)` means no
    /// task exists for the ticket yet.
    async fn find_by_external_id(&self, ticket: &str) -> Result<Option<Task>, TaskStoreError>;

    async fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<Task, TaskStoreError>;

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, TaskStoreError>;
}
