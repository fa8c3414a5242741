// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cw_core::FakeClock;
use std::time::Duration as StdDuration;

fn harness() -> (Arc<LockRegistry>, Arc<EventRouter>, FakeClock, Watchdog<FakeClock>) {
    let locks = Arc::new(LockRegistry::in_memory());
    let router = Arc::new(EventRouter::new());
    let clock = FakeClock::new();
    clock.set_epoch_secs(1_000_000);
    let watchdog = Watchdog::new(
        Arc::clone(&locks),
        Arc::clone(&router),
        clock.clone(),
        StdDuration::from_secs(10),
    );
    (locks, router, clock, watchdog)
}

#[test]
fn sweep_releases_expired_and_queues_tick() {
    let (locks, router, clock, watchdog) = harness();
    locks.try_acquire(1, "runner-a", StdDuration::from_secs(5), clock.epoch_secs());
    locks.try_acquire(2, "runner-a", StdDuration::from_secs(500), clock.epoch_secs());

    clock.advance(StdDuration::from_secs(6));
    let released = watchdog.sweep();

    assert_eq!(released, vec![1]);
    assert_eq!(router.drain(1), vec![Event::Tick]);
    assert!(router.drain(2).is_empty());
    assert_eq!(locks.list_locks().len(), 1);
}

#[test]
fn sweep_with_nothing_expired_is_a_noop() {
    let (locks, router, clock, watchdog) = harness();
    locks.try_acquire(1, "runner-a", StdDuration::from_secs(500), clock.epoch_secs());

    assert!(watchdog.sweep().is_empty());
    assert!(router.drain(1).is_empty());
}

#[tokio::test]
async fn run_stops_on_cancel() {
    let (_locks, _router, clock, watchdog) = harness();
    let watchdog = Arc::new(Watchdog::new(
        Arc::new(LockRegistry::in_memory()),
        Arc::new(EventRouter::new()),
        clock,
        StdDuration::from_millis(5),
    ));
    let cancel = CancellationToken::new();
    let handle = {
        let watchdog = Arc::clone(&watchdog);
        let cancel = cancel.clone();
        tokio::spawn(async move { watchdog.run(cancel).await })
    };

    cancel.cancel();
    tokio::time::timeout(StdDuration::from_secs(1), handle)
        .await
        .expect("watchdog did not stop")
        .unwrap();
}

#[test]
fn reclaimed_workflow_is_reacquirable() {
    let (locks, _router, clock, watchdog) = harness();
    locks.try_acquire(1, "hung-runner", StdDuration::from_secs(5), clock.epoch_secs());

    clock.advance(StdDuration::from_secs(6));
    watchdog.sweep();

    assert!(matches!(
        locks.try_acquire(1, "runner-b", StdDuration::from_secs(5), clock.epoch_secs()),
        crate::registry::AcquireResult::Acquired { .. }
    ));
}
