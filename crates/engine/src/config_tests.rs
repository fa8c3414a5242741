// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn defaults_match_documented_values() {
    let config = EngineConfig::default();
    assert_eq!(config.poll_interval, Duration::from_secs(30));
    assert_eq!(config.lock_ttl, Duration::from_secs(300));
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.abandon_ttl, Duration::from_secs(14 * 24 * 60 * 60));
    assert_eq!(config.max_concurrent_workflows, 4);
    assert_eq!(config.watchdog_interval, Duration::from_secs(10));
    assert_eq!(config.backoff_base, Duration::from_secs(15));
}

#[test]
fn workflow_config_snapshot() {
    let config = EngineConfig::default()
        .lock_ttl(Duration::from_secs(60))
        .max_retries(3);
    let snapshot = config.workflow_config();
    assert_eq!(snapshot.lock_ttl_s, 60);
    assert_eq!(snapshot.max_retries, 3);
    assert_eq!(snapshot.poll_interval_s, 30);
}

#[yare::parameterized(
    first = { 1, 15 },
    second = { 2, 30 },
    third = { 3, 60 },
    fourth = { 4, 120 },
)]
fn backoff_doubles(retry_count: u32, expected_secs: u64) {
    let config = EngineConfig::default();
    assert_eq!(config.retry_backoff(retry_count), Duration::from_secs(expected_secs));
}

#[test]
fn backoff_is_capped_at_one_hour() {
    let config = EngineConfig::default();
    assert_eq!(config.retry_backoff(30), Duration::from_secs(3600));
}

#[test]
fn zero_retries_use_base_backoff() {
    let config = EngineConfig::default();
    assert_eq!(config.retry_backoff(0), config.backoff_base);
}
