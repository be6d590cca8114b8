//! Escalation Integration Tests
//!
//! Drives `EscalationCoordinator` end to end against the in-memory platform:
//! pool aggregation across pages, proportional selection and the additive
//! queue mutation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use surge_roster::roster::{EscalationCoordinator, EscalationOutcome, Paginator, PoolDirectory, SeverityPolicy};
use surge_roster::testing::InMemoryPlatform;
use surge_roster::types::{EscalationRequest, Importance};

fn default_policy() -> SeverityPolicy {
    SeverityPolicy::new(BTreeMap::from([
        (Importance::Critical, 0.5),
        (Importance::High, 0.3),
        (Importance::Medium, 0.15),
        (Importance::Low, 0.0),
    ]))
}

fn finance_pools() -> PoolDirectory {
    PoolDirectory::new(
        HashMap::from([("Finance".to_string(), "grp-finance".to_string())]),
        None,
    )
}

fn request(category: &str, severity: Importance, queue: &str) -> EscalationRequest {
    EscalationRequest {
        category: category.to_string(),
        severity,
        queue_id: queue.to_string(),
    }
}

fn coordinator(platform: &Arc<InMemoryPlatform>, page_size: u32) -> EscalationCoordinator<InMemoryPlatform> {
    EscalationCoordinator::new(Arc::clone(platform), default_policy(), finance_pools())
        .with_paginator(Paginator::new(page_size))
}

#[tokio::test]
async fn critical_escalation_adds_first_half_of_pool() {
    let platform = Arc::new(InMemoryPlatform::with_group("grp-finance", 20));
    let coord = coordinator(&platform, 7);

    let outcome = coord
        .escalate(&request("Finance", Importance::Critical, "q-markets"))
        .await
        .unwrap();

    let expected: Vec<String> = (0..10).map(|i| format!("user-{i:03}")).collect();
    match &outcome {
        EscalationOutcome::Applied {
            pool_size, members, ..
        } => {
            assert_eq!(*pool_size, 20);
            let ids: Vec<String> = members.iter().map(|m| m.id.clone()).collect();
            assert_eq!(ids, expected);
        }
        other => panic!("expected Applied, got {other:?}"),
    }

    // 20 members at 7 per page → 3 listing pages, then exactly one mutation.
    assert_eq!(platform.page_requests(), 3);
    let mutations = platform.mutations();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].queue_id, "q-markets");
    assert_eq!(mutations[0].member_ids, expected);
    assert_eq!(platform.queue_members("q-markets"), expected);
}

#[tokio::test]
async fn repeated_escalation_leaves_queue_membership_unchanged() {
    let platform = Arc::new(InMemoryPlatform::with_group("grp-finance", 20));
    let coord = coordinator(&platform, 50);
    let req = request("Finance", Importance::Critical, "q-markets");

    coord.escalate(&req).await.unwrap();
    let after_first = platform.queue_members("q-markets");
    coord.escalate(&req).await.unwrap();

    assert_eq!(platform.queue_members("q-markets"), after_first);
    assert_eq!(after_first.len(), 10);
}

#[tokio::test]
async fn severity_levels_select_proportional_prefixes() {
    let cases = [
        (Importance::Critical, 10),
        (Importance::High, 6),
        (Importance::Medium, 3),
    ];
    for (severity, expected) in cases {
        let platform = Arc::new(InMemoryPlatform::with_group("grp-finance", 20));
        let coord = coordinator(&platform, 50);
        let outcome = coord.escalate(&request("Finance", severity, "q-1")).await.unwrap();
        match outcome {
            EscalationOutcome::Applied { members, .. } => {
                assert_eq!(members.len(), expected, "severity {severity}");
                assert_eq!(members[0].id, "user-000");
            }
            other => panic!("severity {severity}: expected Applied, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn low_severity_is_a_no_op() {
    let platform = Arc::new(InMemoryPlatform::with_group("grp-finance", 20));
    let coord = coordinator(&platform, 50);

    let outcome = coord.escalate(&request("Finance", Importance::Low, "q-1")).await.unwrap();
    assert!(outcome.is_no_op());
    assert!(platform.mutations().is_empty());
}

#[tokio::test]
async fn unmapped_category_touches_nothing() {
    let platform = Arc::new(InMemoryPlatform::with_group("grp-finance", 20));
    let coord = coordinator(&platform, 50);

    let outcome = coord
        .escalate(&request("Travel", Importance::Critical, "q-1"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        EscalationOutcome::NoPoolMapped {
            category: "Travel".to_string()
        }
    );
    assert_eq!(platform.page_requests(), 0);
    assert_eq!(platform.mutation_attempts(), 0);
}

#[tokio::test]
async fn concurrent_page_fetch_preserves_platform_order() {
    let platform = Arc::new(InMemoryPlatform::with_group("grp-finance", 103));
    let coord = EscalationCoordinator::new(Arc::clone(&platform), default_policy(), finance_pools())
        .with_paginator(Paginator::new(10).with_concurrency(4));

    let pool = coord.reserve_pool("grp-finance").await.unwrap();
    assert_eq!(pool.len(), 103);
    let ids: Vec<&str> = pool.iter().map(|m| m.id.as_str()).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
}

#[tokio::test]
async fn empty_pool_selects_nobody() {
    let platform = Arc::new(InMemoryPlatform::with_group("grp-finance", 0));
    let coord = coordinator(&platform, 50);

    let outcome = coord
        .escalate(&request("Finance", Importance::Critical, "q-1"))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        EscalationOutcome::NothingSelected { pool_size: 0, .. }
    ));
    assert_eq!(platform.mutation_attempts(), 0);
}
