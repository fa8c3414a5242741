// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Watchdog: reclaims locks from stalled or crashed workers.
//!
//! Runs independently of the runner. Any lock held past its TTL is swept,
//! and a `tick` event is queued for the released workflow so the engine
//! re-evaluates it on the next poll. This is the liveness safety-net: a
//! hung worker can delay a workflow by at most `lock_ttl +
//! watchdog_interval`.

use crate::registry::LockRegistry;
use crate::router::EventRouter;
use cw_core::{Clock, Event};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Watchdog<C: Clock> {
    locks: Arc<LockRegistry>,
    router: Arc<EventRouter>,
    clock: C,
    interval: Duration,
}

impl<C: Clock> Watchdog<C> {
    pub fn new(
        locks: Arc<LockRegistry>,
        router: Arc<EventRouter>,
        clock: C,
        interval: Duration,
    ) -> Self {
        Self { locks, router, clock, interval }
    }

    /// Sweep on a fixed cadence until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {
                    self.sweep();
                }
            }
        }
    }

    /// One sweep: release expired locks and queue re-evaluation ticks.
    pub fn sweep(&self) -> Vec<u64> {
        let released = self.locks.sweep_expired(self.clock.epoch_secs());
        for &workflow_id in &released {
            tracing::warn!(workflow = workflow_id, "expired lock reclaimed");
            self.router.push(workflow_id, Event::Tick);
        }
        released
    }
}

#[cfg(test)]
#[path = "watchdog_tests.rs"]
mod tests;
