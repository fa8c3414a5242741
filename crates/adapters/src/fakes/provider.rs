// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable in-memory provider.

use crate::provider::{
    Issue, NewPullRequest, PrEvent, PrEventKind, Provider, ProviderError, PullRequest,
    PullRequestState,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

#[derive(Default)]
struct State {
    issues: HashMap<u64, Issue>,
    closed_issues: Vec<u64>,
    prs: HashMap<u64, PullRequest>,
    pr_heads: HashMap<String, u64>,
    pr_events: HashMap<u64, Vec<PrEvent>>,
    labels: HashMap<u64, Vec<String>>,
    pushed: Vec<String>,
    next_pr_number: u64,
    open_pr_calls: u32,
    fail_next: VecDeque<ProviderError>,
}

/// In-memory [`Provider`] with scripted failures and call counters.
///
/// Closed or deleted issues surface as `NotFound` from `get_issue`, which is
/// how the engine's issue-open guard observes upstream state.
#[derive(Clone, Default)]
pub struct FakeProvider {
    state: Arc<Mutex<State>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an open issue.
    pub fn add_issue(&self, number: u64, title: &str) {
        self.state.lock().issues.insert(
            number,
            Issue {
                number,
                title: title.to_string(),
                body: String::new(),
                labels: Vec::new(),
                updated_at: 0,
            },
        );
    }

    /// Remove an issue upstream (simulates close-or-delete by a human).
    pub fn remove_issue(&self, number: u64) {
        self.state.lock().issues.remove(&number);
    }

    /// Seed an already-open PR for a head branch (crash-recovery scenarios).
    pub fn seed_pr(&self, number: u64, head: &str) {
        let mut state = self.state.lock();
        state.prs.insert(
            number,
            PullRequest {
                number,
                url: format!("https://example.test/pr/{number}"),
                state: PullRequestState::Open,
            },
        );
        state.pr_heads.insert(head.to_string(), number);
        state.next_pr_number = state.next_pr_number.max(number);
    }

    /// Queue a review event for a PR.
    pub fn queue_pr_event(&self, number: u64, kind: PrEventKind, id: &str, occurred_at: i64) {
        self.state.lock().pr_events.entry(number).or_default().push(PrEvent {
            id: id.to_string(),
            kind,
            number,
            occurred_at,
        });
    }

    /// Make the next provider call fail with `err`.
    pub fn fail_next(&self, err: ProviderError) {
        self.state.lock().fail_next.push_back(err);
    }

    pub fn open_pr_calls(&self) -> u32 {
        self.state.lock().open_pr_calls
    }

    pub fn pushed_branches(&self) -> Vec<String> {
        self.state.lock().pushed.clone()
    }

    pub fn pr_count(&self) -> usize {
        self.state.lock().prs.len()
    }

    pub fn closed_issues(&self) -> Vec<u64> {
        self.state.lock().closed_issues.clone()
    }

    pub fn labels_for(&self, number: u64) -> Option<Vec<String>> {
        self.state.lock().labels.get(&number).cloned()
    }

    fn take_failure(&self) -> Result<(), ProviderError> {
        match self.state.lock().fail_next.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Provider for FakeProvider {
    async fn list_open_issues_assigned_to_me(
        &self,
        _owner: &str,
        _repo: &str,
    ) -> Result<Vec<Issue>, ProviderError> {
        tokio::task::yield_now().await;
        self.take_failure()?;
        let mut issues: Vec<Issue> = self.state.lock().issues.values().cloned().collect();
        issues.sort_by_key(|i| i.number);
        Ok(issues)
    }

    async fn get_issue(
        &self,
        _owner: &str,
        _repo: &str,
        number: u64,
    ) -> Result<Issue, ProviderError> {
        tokio::task::yield_now().await;
        self.take_failure()?;
        self.state.lock().issues.get(&number).cloned().ok_or(ProviderError::NotFound)
    }

    async fn close_issue(
        &self,
        _owner: &str,
        _repo: &str,
        number: u64,
    ) -> Result<(), ProviderError> {
        tokio::task::yield_now().await;
        self.take_failure()?;
        let mut state = self.state.lock();
        if state.issues.remove(&number).is_none() {
            return Err(ProviderError::NotFound);
        }
        state.closed_issues.push(number);
        Ok(())
    }

    async fn push_branch(
        &self,
        _workspace_path: &Path,
        branch: &str,
    ) -> Result<(), ProviderError> {
        tokio::task::yield_now().await;
        self.take_failure()?;
        self.state.lock().pushed.push(branch.to_string());
        Ok(())
    }

    async fn open_pull_request(
        &self,
        req: NewPullRequest,
    ) -> Result<PullRequest, ProviderError> {
        tokio::task::yield_now().await;
        self.take_failure()?;
        let mut state = self.state.lock();
        state.open_pr_calls += 1;
        if state.pr_heads.contains_key(&req.head) {
            return Err(ProviderError::Conflict(format!("PR already open for {}", req.head)));
        }
        state.next_pr_number += 1;
        let number = state.next_pr_number;
        let pr = PullRequest {
            number,
            url: format!("https://example.test/pr/{number}"),
            state: PullRequestState::Open,
        };
        state.prs.insert(number, pr.clone());
        state.pr_heads.insert(req.head, number);
        Ok(pr)
    }

    async fn find_pull_request_by_head(
        &self,
        _owner: &str,
        _repo: &str,
        head: &str,
    ) -> Result<PullRequest, ProviderError> {
        tokio::task::yield_now().await;
        self.take_failure()?;
        let state = self.state.lock();
        state
            .pr_heads
            .get(head)
            .and_then(|n| state.prs.get(n))
            .cloned()
            .ok_or(ProviderError::NotFound)
    }

    async fn pull_request_events(
        &self,
        _owner: &str,
        _repo: &str,
        number: u64,
        since: i64,
    ) -> Result<Vec<PrEvent>, ProviderError> {
        tokio::task::yield_now().await;
        self.take_failure()?;
        Ok(self
            .state
            .lock()
            .pr_events
            .get(&number)
            .map(|events| events.iter().filter(|e| e.occurred_at > since).cloned().collect())
            .unwrap_or_default())
    }

    async fn set_issue_labels(
        &self,
        _owner: &str,
        _repo: &str,
        number: u64,
        labels: &[String],
    ) -> Result<(), ProviderError> {
        tokio::task::yield_now().await;
        self.take_failure()?;
        self.state.lock().labels.insert(number, labels.to_vec());
        Ok(())
    }
}
