// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error type.
//!
//! Collaborator failures are values, never unwinds: during a tick the engine
//! folds them into `error:observed` events, classified transient or
//! permanent per the originating error.

use cw_adapters::{ProviderError, TaskStoreError, WorkspaceStoreError};
use cw_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("task store error: {0}")]
    Tasks(#[from] TaskStoreError),
    #[error("workspace store error: {0}")]
    Workspaces(#[from] WorkspaceStoreError),
    /// A record reached a state its associations do not support (e.g. a
    /// push with no feature branch recorded). Never auto-repaired.
    #[error("inconsistent workflow record: {0}")]
    Inconsistent(String),
}

impl EngineError {
    /// Permanent errors promote the workflow directly to `Failed`.
    pub fn is_permanent(&self) -> bool {
        match self {
            EngineError::Provider(e) => e.is_permanent(),
            EngineError::Tasks(TaskStoreError::NotFound(_)) => true,
            EngineError::Workspaces(WorkspaceStoreError::NotFound(_)) => true,
            EngineError::Inconsistent(_) => true,
            _ => false,
        }
    }

    /// Extra backoff requested upstream, for rate-limit responses.
    pub fn retry_after_s(&self) -> Option<u64> {
        match self {
            EngineError::Provider(ProviderError::RateLimited { retry_after_s }) => {
                Some(*retry_after_s)
            }
            _ => None,
        }
    }
}
