// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::ticket::ProviderKind;

#[test]
fn serde_envelope_tags() {
    let event = Event::IssueAppeared {
        provider: ProviderKind::Github,
        owner: "acme".to_string(),
        repo: "widget".to_string(),
        number: 42,
        title: "fix the widget".to_string(),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "issue:appeared");
    assert_eq!(json["number"], 42);

    let back: Event = serde_json::from_value(json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn tick_serializes_to_bare_tag() {
    let json = serde_json::to_string(&Event::Tick).unwrap();
    assert_eq!(json, r#"{"type":"tick"}"#);
}

#[test]
fn error_observed_defaults() {
    let event: Event =
        serde_json::from_str(r#"{"type":"error:observed","message":"boom"}"#).unwrap();
    assert_eq!(
        event,
        Event::ErrorObserved { message: "boom".to_string(), permanent: false, retry_after_s: None }
    );
}

#[yare::parameterized(
    created = { Event::PrCreated { number: 9 }, Some(9) },
    approved = { Event::PrReviewApproved { number: 9 }, Some(9) },
    merged = { Event::PrMerged { number: 9 }, Some(9) },
    tick = { Event::Tick, None },
)]
fn pr_number_extraction(event: Event, expected: Option<u64>) {
    assert_eq!(event.pr_number(), expected);
}

#[test]
fn kind_matches_serde_tag() {
    let event = Event::PrChangesRequested { number: 3 };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], event.kind());
}
