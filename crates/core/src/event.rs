// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events that drive workflow transitions.
//!
//! Events are transient: they exist for one processing attempt and are the
//! sole input to a transition. Serializes with the `{"type": "area:verb",
//! ...fields}` envelope.

use crate::ticket::ProviderKind;
use crate::workspace::WorkspaceId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A new open issue assigned to the operator was observed upstream.
    #[serde(rename = "issue:appeared")]
    IssueAppeared {
        provider: ProviderKind,
        owner: String,
        repo: String,
        number: u64,
        title: String,
    },

    /// The workspace store reports the checkout as provisioned.
    #[serde(rename = "workspace:ready")]
    WorkspaceReady { workspace_id: WorkspaceId },

    /// The agent runner reported the outcome of a work session.
    #[serde(rename = "work:reported")]
    WorkReported {
        workflow_id: u64,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },

    /// A pull request for the workflow's feature branch appeared upstream.
    #[serde(rename = "pr:created")]
    PrCreated { number: u64 },

    #[serde(rename = "pr:approved")]
    PrReviewApproved { number: u64 },

    #[serde(rename = "pr:changes_requested")]
    PrChangesRequested { number: u64 },

    #[serde(rename = "pr:merged")]
    PrMerged { number: u64 },

    #[serde(rename = "pr:closed")]
    PrClosedWithoutMerge { number: u64 },

    /// An error surfaced by a side effect or collaborator call.
    #[serde(rename = "error:observed")]
    ErrorObserved {
        message: String,
        /// Permanent errors promote directly to `Failed`; transient ones retry.
        #[serde(default)]
        permanent: bool,
        /// Extra backoff requested upstream (rate limiting).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after_s: Option<u64>,
    },

    /// Synthesized when no external event is pending; re-evaluates guards.
    #[serde(rename = "tick")]
    Tick,
}

impl Event {
    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::IssueAppeared { .. } => "issue:appeared",
            Event::WorkspaceReady { .. } => "workspace:ready",
            Event::WorkReported { .. } => "work:reported",
            Event::PrCreated { .. } => "pr:created",
            Event::PrReviewApproved { .. } => "pr:approved",
            Event::PrChangesRequested { .. } => "pr:changes_requested",
            Event::PrMerged { .. } => "pr:merged",
            Event::PrClosedWithoutMerge { .. } => "pr:closed",
            Event::ErrorObserved { .. } => "error:observed",
            Event::Tick => "tick",
        }
    }

    /// The upstream PR number this event refers to, if any.
    pub fn pr_number(&self) -> Option<u64> {
        match self {
            Event::PrCreated { number }
            | Event::PrReviewApproved { number }
            | Event::PrChangesRequested { number }
            | Event::PrMerged { number }
            | Event::PrClosedWithoutMerge { number } => Some(*number),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
