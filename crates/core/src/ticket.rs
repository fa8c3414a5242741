// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External ticket identifiers.
//!
//! The canonical string form is `<provider>:<owner>/<repo>#<issue-number>`,
//! ASCII-only. This is the join key between workflows, tasks, and upstream
//! issues, so parsing is strict: missing provider, missing separators, or a
//! non-numeric issue suffix are rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Hosted source-control provider kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Github,
    Gitlab,
    Bitbucket,
}

crate::simple_display! {
    ProviderKind {
        Github => "github",
        Gitlab => "gitlab",
        Bitbucket => "bitbucket",
    }
}

impl FromStr for ProviderKind {
    type Err = TicketParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(ProviderKind::Github),
            "gitlab" => Ok(ProviderKind::Gitlab),
            "bitbucket" => Ok(ProviderKind::Bitbucket),
            "" => Err(TicketParseError::MissingProvider),
            other => Err(TicketParseError::UnknownProvider(other.to_string())),
        }
    }
}

/// Errors from parsing an external ticket id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TicketParseError {
    #[error("missing provider prefix (expected `<provider>:<owner>/<repo>#<n>`)")]
    MissingProvider,
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("missing `{0}` separator")]
    MissingSeparator(char),
    #[error("empty {0} segment")]
    EmptySegment(&'static str),
    #[error("issue number is not numeric: {0}")]
    NonNumericIssue(String),
    #[error("ticket id must be ASCII")]
    NonAscii,
}

/// Parsed external ticket id: provider + project coordinates + issue number.
///
/// Displays back to the canonical `<provider>:<owner>/<repo>#<n>` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketRef {
    pub provider: ProviderKind,
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl TicketRef {
    pub fn new(
        provider: ProviderKind,
        owner: impl Into<String>,
        repo: impl Into<String>,
        number: u64,
    ) -> Self {
        Self { provider, owner: owner.into(), repo: repo.into(), number }
    }

    /// Parse the canonical `<provider>:<owner>/<repo>#<n>` form.
    pub fn parse(s: &str) -> Result<Self, TicketParseError> {
        if !s.is_ascii() {
            return Err(TicketParseError::NonAscii);
        }
        let (provider, rest) = s.split_once(':').ok_or(TicketParseError::MissingProvider)?;
        let provider: ProviderKind = provider.parse()?;
        let (project, number) =
            rest.rsplit_once('#').ok_or(TicketParseError::MissingSeparator('#'))?;
        let (owner, repo) =
            project.split_once('/').ok_or(TicketParseError::MissingSeparator('/'))?;
        if owner.is_empty() {
            return Err(TicketParseError::EmptySegment("owner"));
        }
        if repo.is_empty() {
            return Err(TicketParseError::EmptySegment("repo"));
        }
        let number = number
            .parse::<u64>()
            .map_err(|_| TicketParseError::NonNumericIssue(number.to_string()))?;
        Ok(Self { provider, owner: owner.to_string(), repo: repo.to_string(), number })
    }
}

impl fmt::Display for TicketRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}#{}", self.provider, self.owner, self.repo, self.number)
    }
}

impl FromStr for TicketRef {
    type Err = TicketParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[path = "ticket_tests.rs"]
mod tests;
