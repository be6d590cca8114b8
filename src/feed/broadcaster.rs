//! Feed Change Broadcaster
//!
//! Polls one feed on a fixed interval and publishes the full entry set to
//! subscribers only when it differs from the last published set.
//!
//! ```text
//! Idle ─tick─► Fetching ─┬─ error ─────────► Idle   (previous set retained)
//!                        ├─ same set ──────► Idle
//!                        └─ different set ─► Broadcasting ─► Idle
//! ```
//!
//! Subscribers hold a `watch::Receiver<FeedSnapshot>`: a subscriber that is
//! busy when a change lands simply observes the newest snapshot afterwards.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::FeedSource;
use crate::types::FeedEntry;

/// The latest published entry set.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot {
    pub source: String,
    pub entries: Arc<Vec<FeedEntry>>,
    /// Incremented on every broadcast; 0 means nothing published yet.
    pub revision: u64,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl FeedSnapshot {
    /// Nothing published yet.
    pub fn unpublished(source: &str) -> Self {
        Self {
            source: source.to_string(),
            entries: Arc::new(Vec::new()),
            revision: 0,
            fetched_at: None,
        }
    }

    pub fn is_published(&self) -> bool {
        self.revision > 0
    }
}

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Unchanged,
    Changed {
        entries: Arc<Vec<FeedEntry>>,
        /// Entries whose identifiers had not been seen before this cycle.
        new_entries: Vec<FeedEntry>,
    },
    Failed,
}

/// Bounded set of identifiers, evicting the oldest first.
#[derive(Debug)]
pub struct SeenSet {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl SeenSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    /// Record `id`; returns true if it was not already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.members.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.members.insert(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Polls a [`FeedSource`] and fans out changes.
pub struct FeedBroadcaster<S: FeedSource + ?Sized> {
    source: Arc<S>,
    url: String,
    poll_interval: Duration,
    fetch_timeout: Duration,
    seen: SeenSet,
    tx: watch::Sender<FeedSnapshot>,
}

impl<S: FeedSource + ?Sized> FeedBroadcaster<S> {
    pub fn new(source: Arc<S>, url: impl Into<String>) -> Self {
        use crate::config::defaults::{FEED_FETCH_TIMEOUT_SECS, FEED_POLL_INTERVAL_SECS, SEEN_IDENTIFIER_CAPACITY};

        let url = url.into();
        let (tx, _rx) = watch::channel(FeedSnapshot::unpublished(&url));
        Self {
            source,
            url,
            poll_interval: Duration::from_secs(FEED_POLL_INTERVAL_SECS),
            fetch_timeout: Duration::from_secs(FEED_FETCH_TIMEOUT_SECS),
            seen: SeenSet::new(SEEN_IDENTIFIER_CAPACITY),
            tx,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn with_seen_capacity(mut self, capacity: usize) -> Self {
        self.seen = SeenSet::new(capacity);
        self
    }

    /// A receiver that starts at the current snapshot.
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> FeedSnapshot {
        self.tx.borrow().clone()
    }

    /// Run one fetch/compare/broadcast cycle.
    pub async fn poll_once(&mut self) -> CycleOutcome {
        let fetched = match tokio::time::timeout(self.fetch_timeout, self.source.fetch_entries(&self.url)).await {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => {
                warn!(
                    source = self.source.source_name(),
                    url = %self.url,
                    error = %e,
                    "Feed fetch failed, keeping previous set"
                );
                return CycleOutcome::Failed;
            }
            Err(_) => {
                warn!(
                    source = self.source.source_name(),
                    url = %self.url,
                    timeout_secs = self.fetch_timeout.as_secs(),
                    "Feed fetch timed out, keeping previous set"
                );
                return CycleOutcome::Failed;
            }
        };

        if *self.tx.borrow().entries == fetched {
            debug!(url = %self.url, entries = fetched.len(), "Feed unchanged");
            return CycleOutcome::Unchanged;
        }

        let new_entries: Vec<FeedEntry> = fetched
            .iter()
            .filter(|entry| self.seen.insert(&entry.identifier))
            .cloned()
            .collect();

        let entries = Arc::new(fetched);
        let revision = self.tx.borrow().revision + 1;
        self.tx.send_replace(FeedSnapshot {
            source: self.url.clone(),
            entries: Arc::clone(&entries),
            revision,
            fetched_at: Some(Utc::now()),
        });

        info!(
            url = %self.url,
            revision,
            entries = entries.len(),
            new_entries = new_entries.len(),
            subscribers = self.tx.receiver_count(),
            "Feed changed, broadcasting"
        );

        CycleOutcome::Changed { entries, new_entries }
    }

    /// Poll immediately, then every `poll_interval`, until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            "[FeedBroadcaster] Polling {} every {}s",
            self.url,
            self.poll_interval.as_secs()
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[FeedBroadcaster] Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
    }
}
