//! Auto Dispatcher
//!
//! Automatic mode: watches the feed broadcaster, classifies entries it has
//! not seen before, and turns classifications that match a [`DispatchRule`]
//! into escalation requests.
//!
//! Matches for the same `(category, queue)` within one change collapse to the
//! highest importance, since a second escalation against the same pool
//! snapshot would select the same members. Every failure is logged and the
//! dispatcher keeps running. Entries whose classification failed stay unseen
//! and are retried after `retry_interval` even if the feed does not change.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classifier::{ClassificationPipeline, Classifier};
use crate::config::DispatchRule;
use crate::feed::{FeedSnapshot, SeenSet};
use crate::platform::RosterPlatform;
use crate::roster::{EscalationCoordinator, EscalationOutcome};
use crate::types::{Classification, EscalationRequest, FeedEntry, Topic};

/// Counters for one handled snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub new_entries: usize,
    pub classified: usize,
    pub classification_failures: usize,
    pub requests: Vec<EscalationRequest>,
    pub applied: usize,
    pub no_ops: usize,
    pub failed: usize,
}

/// Does `rule` fire for `classification`?
pub fn rule_matches(rule: &DispatchRule, classification: &Classification) -> bool {
    let topic_ok = rule.topic.trim() == "*" || Topic::parse_lenient(&rule.topic) == classification.topic;
    let importance_ok = classification.importance >= rule.min_importance;
    let location_ok = rule.location_contains.as_deref().map_or(true, |needle| {
        classification
            .location
            .to_lowercase()
            .contains(&needle.trim().to_lowercase())
    });
    topic_ok && importance_ok && location_ok
}

/// Escalation requests for a set of classifications, one per `(category, queue)`
/// at the highest matching importance. Ordered by category, then queue.
pub fn plan_requests(rules: &[DispatchRule], classifications: &[Classification]) -> Vec<EscalationRequest> {
    let mut planned: BTreeMap<(String, String), EscalationRequest> = BTreeMap::new();

    for classification in classifications {
        for rule in rules.iter().filter(|r| rule_matches(r, classification)) {
            let key = (rule.category.clone(), rule.queue_id.clone());
            planned
                .entry(key)
                .and_modify(|req| req.severity = req.severity.max(classification.importance))
                .or_insert_with(|| EscalationRequest {
                    category: rule.category.clone(),
                    severity: classification.importance,
                    queue_id: rule.queue_id.clone(),
                });
        }
    }

    planned.into_values().collect()
}

pub struct AutoDispatcher<C: Classifier + ?Sized, P: RosterPlatform + ?Sized> {
    pipeline: Arc<ClassificationPipeline<C>>,
    coordinator: Arc<EscalationCoordinator<P>>,
    rules: Vec<DispatchRule>,
    max_batch: usize,
    retry_interval: Duration,
    seen: SeenSet,
}

impl<C: Classifier + ?Sized, P: RosterPlatform + ?Sized> AutoDispatcher<C, P> {
    pub fn new(
        pipeline: Arc<ClassificationPipeline<C>>,
        coordinator: Arc<EscalationCoordinator<P>>,
        rules: Vec<DispatchRule>,
    ) -> Self {
        use crate::config::defaults::{CLASSIFIER_MAX_BATCH, DISPATCH_RETRY_INTERVAL_SECS, SEEN_IDENTIFIER_CAPACITY};
        Self {
            pipeline,
            coordinator,
            rules,
            max_batch: CLASSIFIER_MAX_BATCH,
            retry_interval: Duration::from_secs(DISPATCH_RETRY_INTERVAL_SECS),
            seen: SeenSet::new(SEEN_IDENTIFIER_CAPACITY),
        }
    }

    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    pub fn with_seen_capacity(mut self, capacity: usize) -> Self {
        self.seen = SeenSet::new(capacity);
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Classify the unseen entries of `entries` and escalate on rule matches.
    ///
    /// Entries are marked seen only once their chunk classifies successfully,
    /// so a failed chunk is retried on the next change.
    pub async fn handle_entries(&mut self, entries: &[FeedEntry]) -> DispatchReport {
        let fresh: Vec<&FeedEntry> = entries
            .iter()
            .filter(|e| !self.seen.contains(&e.identifier))
            .collect();

        let mut report = DispatchReport {
            new_entries: fresh.len(),
            ..DispatchReport::default()
        };
        if fresh.is_empty() {
            debug!("[AutoDispatcher] No new entries");
            return report;
        }

        let mut classifications = Vec::with_capacity(fresh.len());
        for chunk in fresh.chunks(self.max_batch) {
            let articles: Vec<_> = chunk.iter().map(|e| e.to_article()).collect();
            match self.pipeline.classify(&articles).await {
                Ok(batch) => {
                    for entry in chunk {
                        self.seen.insert(&entry.identifier);
                    }
                    report.classified += batch.len();
                    classifications.extend(batch);
                }
                Err(e) => {
                    report.classification_failures += chunk.len();
                    warn!(entries = chunk.len(), error = %e, "[AutoDispatcher] Classification failed");
                }
            }
        }

        report.requests = plan_requests(&self.rules, &classifications);
        for request in &report.requests {
            match self.coordinator.escalate(request).await {
                Ok(outcome @ EscalationOutcome::Applied { .. }) => {
                    report.applied += 1;
                    debug!(?outcome, "[AutoDispatcher] Escalation applied");
                }
                Ok(outcome) => {
                    report.no_ops += 1;
                    debug!(?outcome, "[AutoDispatcher] Escalation was a no-op");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        category = %request.category,
                        queue_id = %request.queue_id,
                        severity = %request.severity,
                        error = %e,
                        "[AutoDispatcher] Escalation failed"
                    );
                }
            }
        }

        info!(
            new_entries = report.new_entries,
            classified = report.classified,
            requests = report.requests.len(),
            applied = report.applied,
            failed = report.failed,
            "[AutoDispatcher] Change handled"
        );
        report
    }

    /// Handle `entries`, returning them again if some failed to classify.
    async fn handle_tracked(&mut self, entries: Arc<Vec<FeedEntry>>) -> Option<Arc<Vec<FeedEntry>>> {
        let report = self.handle_entries(&entries).await;
        (report.classification_failures > 0).then_some(entries)
    }

    /// Handle every published snapshot until cancelled.
    pub async fn run(mut self, mut updates: watch::Receiver<FeedSnapshot>, cancel: CancellationToken) {
        info!("[AutoDispatcher] Started with {} rule(s)", self.rules.len());

        // A snapshot published before we subscribed is not signalled by `changed()`.
        let initial = updates.borrow_and_update().clone();
        let mut pending = None;
        if initial.is_published() {
            pending = self.handle_tracked(initial.entries).await;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[AutoDispatcher] Shutdown requested");
                    break;
                }
                changed = updates.changed() => {
                    if changed.is_err() {
                        info!("[AutoDispatcher] Feed broadcaster stopped");
                        break;
                    }
                    let snapshot = updates.borrow_and_update().clone();
                    pending = self.handle_tracked(snapshot.entries).await;
                }
                _ = tokio::time::sleep(self.retry_interval), if pending.is_some() => {
                    if let Some(entries) = pending.take() {
                        debug!("[AutoDispatcher] Retrying entries that failed to classify");
                        pending = self.handle_tracked(entries).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::{Paginator, PoolDirectory, SeverityPolicy};
    use crate::testing::{numbered_reply, sample_entries, CannedClassifier, InMemoryPlatform};
    use crate::types::Importance;
    use std::collections::HashMap;

    fn rule(topic: &str, min: Importance, category: &str, queue: &str) -> DispatchRule {
        DispatchRule {
            topic: topic.to_string(),
            min_importance: min,
            location_contains: None,
            category: category.to_string(),
            queue_id: queue.to_string(),
        }
    }

    fn classification(topic: Topic, location: &str, importance: Importance) -> Classification {
        Classification {
            topic,
            location: location.to_string(),
            importance,
        }
    }

    #[test]
    fn test_rule_matching() {
        let mut r = rule("Disaster", Importance::High, "Humanitarian", "q-1");
        assert!(rule_matches(&r, &classification(Topic::Disaster, "", Importance::Critical)));
        assert!(!rule_matches(&r, &classification(Topic::Disaster, "", Importance::Medium)));
        assert!(!rule_matches(&r, &classification(Topic::Finance, "", Importance::Critical)));

        r.location_contains = Some("chile".into());
        assert!(rule_matches(&r, &classification(Topic::Disaster, "Santiago, Chile", Importance::High)));
        assert!(!rule_matches(&r, &classification(Topic::Disaster, "", Importance::High)));

        let any = rule("*", Importance::Low, "Media", "q-2");
        assert!(rule_matches(&any, &classification(Topic::Other("Sports".into()), "", Importance::Low)));
    }

    #[test]
    fn test_plan_collapses_to_highest_importance() {
        let rules = vec![rule("*", Importance::Medium, "Finance", "q-fin")];
        let planned = plan_requests(
            &rules,
            &[
                classification(Topic::Finance, "", Importance::Medium),
                classification(Topic::Finance, "", Importance::Critical),
                classification(Topic::Finance, "", Importance::High),
                classification(Topic::Finance, "", Importance::Low),
            ],
        );
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].severity, Importance::Critical);
        assert_eq!(planned[0].queue_id, "q-fin");
    }

    fn dispatcher(
        classifier: Arc<CannedClassifier>,
        platform: Arc<InMemoryPlatform>,
        rules: Vec<DispatchRule>,
    ) -> AutoDispatcher<CannedClassifier, InMemoryPlatform> {
        let policy = SeverityPolicy::new(
            [(Importance::Critical, 0.5), (Importance::High, 0.25)]
                .into_iter()
                .collect(),
        );
        let pools = PoolDirectory::new(
            HashMap::from([("Humanitarian".to_string(), "grp-hum".to_string())]),
            None,
        );
        let coordinator = EscalationCoordinator::new(platform, policy, pools).with_paginator(Paginator::new(5));
        AutoDispatcher::new(
            Arc::new(ClassificationPipeline::new(classifier)),
            Arc::new(coordinator),
            rules,
        )
    }

    #[tokio::test]
    async fn test_new_entries_escalate_once() {
        let classifier = Arc::new(CannedClassifier::new());
        classifier.push_reply(numbered_reply(&[
            ("Disaster", Some("Chile"), "CRITICAL"),
            ("Finance", None, "LOW"),
        ]));
        let platform = Arc::new(InMemoryPlatform::with_group("grp-hum", 8));
        let mut d = dispatcher(
            Arc::clone(&classifier),
            Arc::clone(&platform),
            vec![rule("Disaster", Importance::High, "Humanitarian", "q-hum")],
        );

        let entries = sample_entries("n", 2);
        let report = d.handle_entries(&entries).await;
        assert_eq!(report.classified, 2);
        assert_eq!(report.applied, 1);
        assert_eq!(platform.queue_members("q-hum").len(), 4);

        // Same entries again: nothing new, no classifier call.
        let report = d.handle_entries(&entries).await;
        assert_eq!(report.new_entries, 0);
        assert_eq!(classifier.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_chunk_is_retried_later() {
        let classifier = Arc::new(CannedClassifier::new());
        classifier
            .push_failure("upstream 500")
            .push_reply(numbered_reply(&[("Finance", None, "LOW")]));
        let platform = Arc::new(InMemoryPlatform::with_group("grp-hum", 8));
        let mut d = dispatcher(Arc::clone(&classifier), platform, Vec::new());

        let entries = sample_entries("n", 1);
        let first = d.handle_entries(&entries).await;
        assert_eq!(first.classification_failures, 1);

        let second = d.handle_entries(&entries).await;
        assert_eq!(second.classified, 1);
    }

    #[tokio::test]
    async fn test_unmapped_category_is_counted_as_no_op() {
        let classifier = Arc::new(CannedClassifier::new());
        classifier.push_reply(numbered_reply(&[("Disaster", None, "CRITICAL")]));
        let platform = Arc::new(InMemoryPlatform::with_group("grp-hum", 8));
        let mut d = dispatcher(
            classifier,
            Arc::clone(&platform),
            vec![rule("Disaster", Importance::High, "Travel", "q-travel")],
        );

        let report = d.handle_entries(&sample_entries("n", 1)).await;
        assert_eq!(report.no_ops, 1);
        assert!(platform.mutations().is_empty());
    }
}
