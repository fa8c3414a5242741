// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory task store.

use crate::task_store::{TaskStore, TaskStoreError};
use async_trait::async_trait;
use cw_core::{NewTask, Task, TaskFilter, TaskId, TaskPatch, TaskStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct State {
    tasks: HashMap<TaskId, Task>,
    order: Vec<TaskId>,
    created: u32,
}

#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of `create_task` calls (duplicate-task assertions).
    pub fn created_count(&self) -> u32 {
        self.state.lock().created
    }

    pub fn task_statuses(&self) -> Vec<TaskStatus> {
        let state = self.state.lock();
        state.order.iter().filter_map(|id| state.tasks.get(id)).map(|t| t.status).collect()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(&self, new: NewTask) -> Result<Task, TaskStoreError> {
        let task = Task {
            id: TaskId::generate(),
            name: new.name,
            description: new.description,
            status: TaskStatus::Queued,
            priority: new.priority,
            external_ticket_id: new.external_ticket_id,
            workspace_id: None,
            started_at: None,
            completed_at: None,
        };
        let mut state = self.state.lock();
        state.created += 1;
        state.order.push(task.id.clone());
        state.tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: &TaskId) -> Result<Task, TaskStoreError> {
        self.state.lock().tasks.get(id).cloned().ok_or_else(|| TaskStoreError::NotFound(id.clone()))
    }

    async fn find_by_external_id(&self, ticket: &str) -> Result<Option<Task>, TaskStoreError> {
        Ok(self.state.lock().tasks.values().find(|t| t.external_ticket_id == ticket).cloned())
    }

    async fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<Task, TaskStoreError> {
        let mut state = self.state.lock();
        let task =
            state.tasks.get_mut(id).ok_or_else(|| TaskStoreError::NotFound(id.clone()))?;
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(started_at) = patch.started_at {
            task.started_at = Some(started_at);
        }
        if let Some(completed_at) = patch.completed_at {
            task.completed_at = Some(completed_at);
        }
        if let Some(workspace_id) = patch.workspace_id {
            task.workspace_id = Some(workspace_id);
        }
        Ok(task.clone())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, TaskStoreError> {
        let state = self.state.lock();
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.tasks.get(id))
            .filter(|t| filter.status.is_none_or(|s| t.status == s))
            .filter(|t| filter.priority.is_none_or(|p| t.priority == p))
            .cloned()
            .collect())
    }
}
