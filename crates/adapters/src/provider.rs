// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hosted source-control provider contract.
//!
//! One implementation per provider kind (GitHub, GitLab, Bitbucket) exposes
//! the uniform capability set the engine needs: enumerate assigned issues,
//! read issue/PR state, push branches, open PRs, and read PR review events.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors from provider calls.
///
/// The engine maps every non-`NotFound` error to an `error:observed` event;
/// `RateLimited` additionally extends the retry backoff.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("authentication refused: {0}")]
    Auth(String),
    #[error("rate limited, retry after {retry_after_s}s")]
    RateLimited { retry_after_s: u64 },
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("provider error: {0}")]
    Unknown(String),
}

impl ProviderError {
    /// Permanent errors promote a workflow directly to `Failed`; transient
    /// ones go through the retry path.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::Auth(_) | ProviderError::NotFound | ProviderError::Conflict(_)
        )
    }
}

/// An upstream issue assigned to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestState {
    Open,
    Merged,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    pub state: PullRequestState,
}

/// Inputs for `open_pull_request`.
#[derive(Debug, Clone)]
pub struct NewPullRequest {
    pub owner: String,
    pub repo: String,
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrEventKind {
    Approved,
    ChangesRequested,
    Merged,
    Closed,
    CommentAdded,
}

/// A review-stream event on a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrEvent {
    /// Provider-unique id, used for de-duplication.
    pub id: String,
    pub kind: PrEventKind,
    pub number: u64,
    pub occurred_at: i64,
}

/// Uniform provider capability.
///
/// All calls may block on the network; implementations enforce per-call
/// deadlines and surface timeouts as [`ProviderError::Network`].
#[async_trait]
pub trait Provider: Clone + Send + Sync + 'static {
    async fn list_open_issues_assigned_to_me(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<Issue>, ProviderError>;

    async fn get_issue(&self, owner: &str, repo: &str, number: u64)
        -> Result<Issue, ProviderError>;

    async fn close_issue(&self, owner: &str, repo: &str, number: u64)
        -> Result<(), ProviderError>;

    /// Push the branch checked out at `workspace_path` to the remote.
    async fn push_branch(&self, workspace_path: &Path, branch: &str)
        -> Result<(), ProviderError>;

    async fn open_pull_request(&self, req: NewPullRequest)
        -> Result<PullRequest, ProviderError>;

    /// Look up an existing PR by its head branch (idempotence check for
    /// `open_pull_request` across crash recovery).
    async fn find_pull_request_by_head(
        &self,
        owner: &str,
        repo: &str,
        head: &str,
    ) -> Result<PullRequest, ProviderError>;

    async fn pull_request_events(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        since: i64,
    ) -> Result<Vec<PrEvent>, ProviderError>;

    async fn set_issue_labels(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        labels: &[String],
    ) -> Result<(), ProviderError>;
}
