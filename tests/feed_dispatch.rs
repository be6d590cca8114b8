//! Feed → classification → escalation integration tests
//!
//! Runs the broadcaster and auto-dispatcher loops together on paused Tokio
//! time against scripted collaborators.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use surge_roster::classifier::ClassificationPipeline;
use surge_roster::config::DispatchRule;
use surge_roster::dispatch::AutoDispatcher;
use surge_roster::feed::{CycleOutcome, FeedBroadcaster, FeedSnapshot};
use surge_roster::roster::{EscalationCoordinator, PoolDirectory, SeverityPolicy};
use surge_roster::testing::{numbered_reply, sample_entries, CannedClassifier, InMemoryPlatform, ScriptedFeed};
use surge_roster::types::{FeedEntry, Importance, RosterMember};

fn pool(prefix: &str, size: usize) -> Vec<RosterMember> {
    (0..size)
        .map(|i| RosterMember::new(format!("{prefix}-{i:02}"), format!("{prefix} {i:02}")))
        .collect()
}

fn platform() -> Arc<InMemoryPlatform> {
    let platform = InMemoryPlatform::new();
    platform.insert_group("grp-relief", pool("relief", 20));
    platform.insert_group("grp-finance", pool("finance", 20));
    Arc::new(platform)
}

fn coordinator(platform: &Arc<InMemoryPlatform>) -> Arc<EscalationCoordinator<InMemoryPlatform>> {
    let policy = SeverityPolicy::new(BTreeMap::from([
        (Importance::Critical, 0.5),
        (Importance::High, 0.3),
        (Importance::Medium, 0.15),
        (Importance::Low, 0.0),
    ]));
    let pools = PoolDirectory::new(
        HashMap::from([
            ("Humanitarian".to_string(), "grp-relief".to_string()),
            ("Finance".to_string(), "grp-finance".to_string()),
        ]),
        None,
    );
    Arc::new(EscalationCoordinator::new(Arc::clone(platform), policy, pools))
}

fn rules() -> Vec<DispatchRule> {
    vec![
        DispatchRule {
            topic: "Disaster".into(),
            min_importance: Importance::High,
            location_contains: None,
            category: "Humanitarian".into(),
            queue_id: "q-relief".into(),
        },
        DispatchRule {
            topic: "Finance".into(),
            min_importance: Importance::High,
            location_contains: None,
            category: "Finance".into(),
            queue_id: "q-markets".into(),
        },
    ]
}

fn with_extra(mut entries: Vec<FeedEntry>, extra: FeedEntry) -> Vec<FeedEntry> {
    entries.push(extra);
    entries
}

#[tokio::test(start_paused = true)]
async fn feed_changes_drive_proportional_escalations() {
    let first = sample_entries("world", 2);
    let second = with_extra(
        first.clone(),
        FeedEntry::new("https://news.test/world/late", "Bank run", "Deposits flee"),
    );

    let feed = Arc::new(ScriptedFeed::new());
    feed.push_entries(first.clone())
        .push_entries(first)
        .push_entries(second);

    let classifier = Arc::new(CannedClassifier::new());
    classifier
        .push_reply(numbered_reply(&[
            ("Disaster", Some("Chile"), "CRITICAL"),
            ("Finance", None, "LOW"),
        ]))
        .push_reply(numbered_reply(&[("Finance", Some("London"), "HIGH")]));

    let platform = platform();
    let broadcaster =
        FeedBroadcaster::new(Arc::clone(&feed), "https://news.test/world.xml").with_poll_interval(Duration::from_secs(60));
    let updates = broadcaster.subscribe();
    let dispatcher = AutoDispatcher::new(
        Arc::new(ClassificationPipeline::new(Arc::clone(&classifier))),
        coordinator(&platform),
        rules(),
    );

    let cancel = CancellationToken::new();
    let dispatch_task = tokio::spawn(dispatcher.run(updates, cancel.clone()));
    let broadcast_task = tokio::spawn(broadcaster.run(cancel.clone()));

    tokio::time::sleep(Duration::from_secs(150)).await;
    cancel.cancel();
    broadcast_task.await.unwrap();
    dispatch_task.await.unwrap();

    // Three polls, two distinct sets, one classifier call per change.
    assert_eq!(feed.fetches(), 3);
    let prompts = classifier.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("Bank run"));
    assert!(!prompts[1].contains("world headline 0"));

    assert_eq!(platform.queue_members("q-relief").len(), 10);
    assert_eq!(platform.queue_members("q-markets").len(), 6);
    assert_eq!(platform.mutations().len(), 2);
}

#[tokio::test]
async fn failed_classification_is_retried_on_next_change() {
    let platform = platform();
    let classifier = Arc::new(CannedClassifier::new());
    classifier
        .push_failure("upstream overloaded")
        .push_reply(numbered_reply(&[
            ("Disaster", None, "HIGH"),
            ("Disaster", None, "LOW"),
        ]));

    let mut dispatcher = AutoDispatcher::new(
        Arc::new(ClassificationPipeline::new(Arc::clone(&classifier))),
        coordinator(&platform),
        rules(),
    );

    let entries = sample_entries("storm", 2);
    let first = dispatcher.handle_entries(&entries).await;
    assert_eq!(first.classification_failures, 2);
    assert!(first.requests.is_empty());

    let second = dispatcher.handle_entries(&entries).await;
    assert_eq!(second.classified, 2);
    assert_eq!(second.applied, 1);
    assert_eq!(platform.queue_members("q-relief").len(), 6);

    // Nothing new the third time round.
    let third = dispatcher.handle_entries(&entries).await;
    assert_eq!(third.new_entries, 0);
    assert_eq!(classifier.prompts().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_classification_is_retried_while_feed_is_steady() {
    let platform = platform();
    let classifier = Arc::new(CannedClassifier::new());
    classifier
        .push_failure("upstream overloaded")
        .push_reply(numbered_reply(&[("Disaster", Some("Chile"), "CRITICAL")]));

    let dispatcher = AutoDispatcher::new(
        Arc::new(ClassificationPipeline::new(Arc::clone(&classifier))),
        coordinator(&platform),
        rules(),
    )
    .with_retry_interval(Duration::from_secs(30));

    // One published set and no further changes.
    let (_tx, rx) = watch::channel(FeedSnapshot {
        source: "https://news.test/world.xml".to_string(),
        entries: Arc::new(sample_entries("quake", 1)),
        revision: 1,
        fetched_at: Some(Utc::now()),
    });

    let cancel = CancellationToken::new();
    let task = tokio::spawn(dispatcher.run(rx, cancel.clone()));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(classifier.prompts().len(), 1);
    assert!(platform.queue_members("q-relief").is_empty());

    tokio::time::sleep(Duration::from_secs(60)).await;
    cancel.cancel();
    task.await.unwrap();

    assert_eq!(classifier.prompts().len(), 2);
    assert_eq!(platform.queue_members("q-relief").len(), 10);
}

#[tokio::test]
async fn lagging_subscriber_sees_only_newest_set() {
    let feed = Arc::new(ScriptedFeed::new());
    feed.push_entries(sample_entries("a", 1))
        .push_entries(sample_entries("b", 2))
        .push_entries(sample_entries("c", 3));

    let mut broadcaster = FeedBroadcaster::new(Arc::clone(&feed), "https://news.test/rss");
    let mut early = broadcaster.subscribe();

    for _ in 0..3 {
        assert!(matches!(broadcaster.poll_once().await, CycleOutcome::Changed { .. }));
    }

    assert!(early.has_changed().unwrap());
    let snapshot = early.borrow_and_update().clone();
    assert_eq!(snapshot.revision, 3);
    assert_eq!(snapshot.entries.len(), 3);

    // A late subscriber starts from the retained set.
    let late = broadcaster.subscribe();
    assert_eq!(late.borrow().revision, 3);
}

#[tokio::test]
async fn fetch_failure_keeps_previous_set() {
    let feed = Arc::new(ScriptedFeed::new());
    feed.push_entries(sample_entries("a", 2))
        .push_failure("connection reset")
        .push_entries(sample_entries("a", 2));

    let mut broadcaster = FeedBroadcaster::new(Arc::clone(&feed), "https://news.test/rss");
    let mut rx = broadcaster.subscribe();

    assert!(matches!(broadcaster.poll_once().await, CycleOutcome::Changed { .. }));
    rx.borrow_and_update();

    assert_eq!(broadcaster.poll_once().await, CycleOutcome::Failed);
    assert_eq!(broadcaster.latest().entries.len(), 2);

    assert_eq!(broadcaster.poll_once().await, CycleOutcome::Unchanged);
    assert!(!rx.has_changed().unwrap());
}
