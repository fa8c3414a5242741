// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine runtime configuration.

use cw_core::WorkflowConfig;
use std::time::Duration;

/// Tunables for the runner, engine, and watchdog.
///
/// A snapshot of the per-workflow subset is stamped onto each record at
/// creation time, so changing the configuration later does not retroactively
/// change in-flight workflows.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Period between runner polls.
    pub poll_interval: Duration,
    /// Per-tick lock deadline.
    pub lock_ttl: Duration,
    /// Retries per state before promotion to `Failed`.
    pub max_retries: u32,
    /// Maximum wall-clock age of a non-terminal workflow.
    pub abandon_ttl: Duration,
    /// Worker-pool cap for concurrent engine ticks.
    pub max_concurrent_workflows: usize,
    /// Expired-lock sweep cadence.
    pub watchdog_interval: Duration,
    /// Base for exponential retry backoff.
    pub backoff_base: Duration,
    /// How long shutdown waits for in-flight ticks before force-release.
    pub shutdown_grace: Duration,
    /// Prefix for generated feature branch names (`<prefix>/issue-<n>`).
    pub branch_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            lock_ttl: Duration::from_secs(5 * 60),
            max_retries: 5,
            abandon_ttl: Duration::from_secs(14 * 24 * 60 * 60),
            max_concurrent_workflows: 4,
            watchdog_interval: Duration::from_secs(10),
            backoff_base: Duration::from_secs(15),
            shutdown_grace: Duration::from_secs(10),
            branch_prefix: "cw".to_string(),
        }
    }
}

impl EngineConfig {
    cw_core::setters! {
        into {
            branch_prefix: String,
        }
        set {
            poll_interval: Duration,
            lock_ttl: Duration,
            max_retries: u32,
            abandon_ttl: Duration,
            max_concurrent_workflows: usize,
            watchdog_interval: Duration,
            backoff_base: Duration,
            shutdown_grace: Duration,
        }
    }

    /// The per-workflow configuration snapshot stamped onto new records.
    pub fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig {
            poll_interval_s: self.poll_interval.as_secs(),
            lock_ttl_s: self.lock_ttl.as_secs(),
            max_retries: self.max_retries,
            abandon_ttl_s: self.abandon_ttl.as_secs(),
        }
    }

    /// Exponential backoff before re-entering a retried state.
    ///
    /// `base * 2^(n-1)`, capped at one hour.
    pub fn retry_backoff(&self, retry_count: u32) -> Duration {
        let exp = retry_count.saturating_sub(1).min(16);
        let secs = self.backoff_base.as_secs().saturating_mul(1u64 << exp);
        Duration::from_secs(secs.min(3600))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
