// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event source: translates upstream provider activity into engine events.
//!
//! The adapter is responsible for de-duplication: the same upstream change
//! must not yield two events, even across overlapping `since` windows.

use crate::provider::{PrEventKind, Provider, ProviderError};
use async_trait::async_trait;
use cw_core::{Event, ProviderKind};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

#[async_trait]
pub trait EventSource: Send + Sync + 'static {
    /// Poll for events on a project since the given epoch-seconds timestamp.
    async fn poll(&self, owner: &str, repo: &str, since: i64) -> Result<Vec<Event>, ProviderError>;

    /// Register a pull request whose review stream should be watched.
    /// Sources that do not watch PRs ignore this.
    fn track_pr(&self, _number: u64) {}

    /// Stop watching a pull request (its workflow went terminal).
    fn untrack_pr(&self, _number: u64) {}
}

/// Provider-backed event source.
///
/// Surfaces `issue:appeared` for open issues assigned to the operator and
/// review-stream events for the pull requests registered via [`track_pr`].
/// Each upstream change is emitted at most once per process lifetime.
///
/// [`track_pr`]: ProviderEventSource::track_pr
#[derive(Clone)]
pub struct ProviderEventSource<P: Provider> {
    provider: P,
    kind: ProviderKind,
    state: Arc<Mutex<SourceState>>,
}

#[derive(Default)]
struct SourceState {
    seen: HashSet<String>,
    tracked_prs: HashSet<u64>,
}

impl<P: Provider> ProviderEventSource<P> {
    pub fn new(provider: P, kind: ProviderKind) -> Self {
        Self { provider, kind, state: Arc::new(Mutex::new(SourceState::default())) }
    }
}

#[async_trait]
impl<P: Provider> EventSource for ProviderEventSource<P> {
    fn track_pr(&self, number: u64) {
        self.state.lock().tracked_prs.insert(number);
    }

    fn untrack_pr(&self, number: u64) {
        self.state.lock().tracked_prs.remove(&number);
    }

    async fn poll(&self, owner: &str, repo: &str, since: i64) -> Result<Vec<Event>, ProviderError> {
        let mut events = Vec::new();

        let issues = self.provider.list_open_issues_assigned_to_me(owner, repo).await?;
        for issue in issues {
            let key = format!("issue:{owner}/{repo}#{}", issue.number);
            if !self.state.lock().seen.insert(key) {
                continue;
            }
            events.push(Event::IssueAppeared {
                provider: self.kind,
                owner: owner.to_string(),
                repo: repo.to_string(),
                number: issue.number,
                title: issue.title,
            });
        }

        let tracked: Vec<u64> = self.state.lock().tracked_prs.iter().copied().collect();
        for number in tracked {
            let pr_events = self.provider.pull_request_events(owner, repo, number, since).await?;
            for pr_event in pr_events {
                if !self.state.lock().seen.insert(format!("pr-event:{}", pr_event.id)) {
                    continue;
                }
                let event = match pr_event.kind {
                    PrEventKind::Approved => Event::PrReviewApproved { number },
                    PrEventKind::ChangesRequested => Event::PrChangesRequested { number },
                    PrEventKind::Merged => Event::PrMerged { number },
                    PrEventKind::Closed => Event::PrClosedWithoutMerge { number },
                    // Review chatter is not a transition input; the engine
                    // observes it through its review-activity guard.
                    PrEventKind::CommentAdded => continue,
                };
                events.push(event);
            }
        }

        tracing::debug!(owner, repo, since, count = events.len(), "event source polled");
        Ok(events)
    }
}

#[cfg(test)]
#[path = "event_source_tests.rs"]
mod tests;
