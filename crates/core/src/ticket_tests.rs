// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parse_roundtrip() {
    let ticket = TicketRef::parse("github:acme/widget#42").unwrap();
    assert_eq!(ticket.provider, ProviderKind::Github);
    assert_eq!(ticket.owner, "acme");
    assert_eq!(ticket.repo, "widget");
    assert_eq!(ticket.number, 42);
    assert_eq!(ticket.to_string(), "github:acme/widget#42");
}

#[yare::parameterized(
    gitlab = { "gitlab:group/proj#1", ProviderKind::Gitlab },
    bitbucket = { "bitbucket:team/repo#999", ProviderKind::Bitbucket },
)]
fn parse_providers(input: &str, expected: ProviderKind) {
    assert_eq!(TicketRef::parse(input).unwrap().provider, expected);
}

#[test]
fn reject_missing_provider() {
    assert_eq!(
        TicketRef::parse("acme/widget#42"),
        Err(TicketParseError::MissingProvider)
    );
}

#[test]
fn reject_unknown_provider() {
    assert!(matches!(
        TicketRef::parse("svn:acme/widget#42"),
        Err(TicketParseError::UnknownProvider(_))
    ));
}

#[yare::parameterized(
    no_hash = { "github:acme/widget-42", '#' },
    no_slash = { "github:acmewidget#42", '/' },
)]
fn reject_missing_separator(input: &str, sep: char) {
    assert_eq!(TicketRef::parse(input), Err(TicketParseError::MissingSeparator(sep)));
}

#[test]
fn reject_non_numeric_issue() {
    assert!(matches!(
        TicketRef::parse("github:acme/widget#abc"),
        Err(TicketParseError::NonNumericIssue(_))
    ));
}

#[test]
fn reject_non_ascii() {
    assert_eq!(
        TicketRef::parse("github:acmé/widget#42"),
        Err(TicketParseError::NonAscii)
    );
}

#[test]
fn reject_empty_segments() {
    assert!(TicketRef::parse("github:/widget#42").is_err());
    assert!(TicketRef::parse("github:acme/#42").is_err());
}

#[test]
fn repo_names_may_contain_hash_free_punctuation() {
    let ticket = TicketRef::parse("github:acme/widget.rs#7").unwrap();
    assert_eq!(ticket.repo, "widget.rs");
}

#[test]
fn provider_kind_serde_is_lowercase() {
    let json = serde_json::to_string(&ProviderKind::Github).unwrap();
    assert_eq!(json, "\"github\"");
    let parsed: ProviderKind = serde_json::from_str("\"bitbucket\"").unwrap();
    assert_eq!(parsed, ProviderKind::Bitbucket);
}
