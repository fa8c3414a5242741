// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cw-adapters: Service contracts the engine composes over.
//!
//! The engine treats the task store, workspace store, and hosting provider
//! as opaque collaborators. This crate defines those contracts as traits,
//! plus the event-source shim that translates upstream provider activity
//! into engine events.

pub mod event_source;
pub mod provider;
pub mod task_store;
pub mod workspace_store;

#[cfg(any(test, feature = "test-support"))]
pub mod fakes;

pub use event_source::{EventSource, ProviderEventSource};
pub use provider::{
    Issue, NewPullRequest, PrEvent, PrEventKind, Provider, ProviderError, PullRequest,
    PullRequestState,
};
pub use task_store::{TaskStore, TaskStoreError};
pub use workspace_store::{WorkspaceStore, WorkspaceStoreError};

#[cfg(any(test, feature = "test-support"))]
pub use fakes::{FakeProvider, InMemoryTaskStore, InMemoryWorkspaceStore, QueueEventSource};
