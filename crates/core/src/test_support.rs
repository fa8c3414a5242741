// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test fixtures and proptest strategies.
//!
//! Available to other crates' tests via the `test-support` feature.

/// Proptest strategies for generating domain values.
pub mod strategies {
    use crate::task::TaskId;
    use crate::ticket::ProviderKind;
    use crate::workflow::{Workflow, WorkflowConfig, WorkflowState};
    use crate::workspace::WorkspaceId;
    use proptest::prelude::*;

    pub fn provider_kind() -> impl Strategy<Value = ProviderKind> {
        prop_oneof![
            Just(ProviderKind::Github),
            Just(ProviderKind::Gitlab),
            Just(ProviderKind::Bitbucket),
        ]
    }

    fn base_state() -> impl Strategy<Value = WorkflowState> {
        prop_oneof![
            Just(WorkflowState::Discovered),
            Just(WorkflowState::TaskCreated),
            Just(WorkflowState::WorkspaceProvisioning),
            Just(WorkflowState::WorkspaceReady),
            Just(WorkflowState::AgentWorking),
            Just(WorkflowState::ChangesReported),
            Just(WorkflowState::BranchPushed),
            Just(WorkflowState::PrOpen),
            Just(WorkflowState::PrInReview),
            Just(WorkflowState::PrChangesRequested),
            Just(WorkflowState::PrApproved),
            Just(WorkflowState::PrMerged),
            Just(WorkflowState::Closed),
            Just(WorkflowState::Cancelled),
            Just(WorkflowState::Failed),
            Just(WorkflowState::Abandoned),
        ]
    }

    pub fn workflow_state() -> impl Strategy<Value = WorkflowState> {
        prop_oneof![
            4 => base_state(),
            1 => base_state().prop_map(|prev| WorkflowState::Retry { prev: Box::new(prev) }),
        ]
    }

    prop_compose! {
        fn coordinates()(
            id in 1u64..10_000,
            owner in "[a-z][a-z0-9-]{0,12}",
            repo in "[a-z][a-z0-9-]{0,12}",
            issue_number in 1u64..100_000,
            provider in provider_kind(),
        ) -> (u64, String, String, u64, ProviderKind) {
            (id, owner, repo, issue_number, provider)
        }
    }

    prop_compose! {
        fn associations()(
            feature_branch in proptest::option::of("[a-z][a-z0-9/-]{0,20}"),
            pr_number in proptest::option::of(1u64..100_000),
            has_task in proptest::bool::ANY,
            has_workspace in proptest::bool::ANY,
        ) -> (Option<String>, Option<u64>, Option<TaskId>, Option<WorkspaceId>) {
            (
                feature_branch,
                pr_number,
                has_task.then(TaskId::generate),
                has_workspace.then(WorkspaceId::generate),
            )
        }
    }

    prop_compose! {
        fn timestamps()(
            created_at in 0i64..2_000_000_000,
            age in 0i64..1_000_000,
            started_at in proptest::option::of(0i64..2_000_000_000),
            ended_at in proptest::option::of(0i64..2_000_000_000),
        ) -> (i64, i64, Option<i64>, Option<i64>) {
            (created_at, created_at + age, started_at, ended_at)
        }
    }

    prop_compose! {
        fn telemetry()(
            error_count in 0u32..100,
            last_error in proptest::option::of(".{0,40}"),
            last_error_at in proptest::option::of(0i64..2_000_000_000),
            retry_count in 0u32..10,
            revision_count in 0u32..5,
        ) -> (u32, Option<String>, Option<i64>, u32, u32) {
            (error_count, last_error, last_error_at, retry_count, revision_count)
        }
    }

    prop_compose! {
        pub fn workflow()(
            coordinates in coordinates(),
            associations in associations(),
            state in workflow_state(),
            timestamps in timestamps(),
            telemetry in telemetry(),
        ) -> Workflow {
            let (id, owner, repo, issue_number, provider) = coordinates;
            let (feature_branch, pr_number, task_id, workspace_id) = associations;
            let (created_at, updated_at, started_at, ended_at) = timestamps;
            let (error_count, last_error, last_error_at, retry_count, revision_count) = telemetry;
            Workflow {
                id,
                owner,
                repo,
                issue_number,
                provider,
                base_branch: "main".to_string(),
                feature_branch,
                pr_number,
                task_id,
                workspace_id,
                state,
                created_at,
                updated_at,
                started_at,
                ended_at,
                error_count,
                last_error,
                last_error_at,
                retry_count,
                revision_count,
                config: WorkflowConfig::default(),
            }
        }
    }
}
