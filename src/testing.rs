//! In-memory collaborators
//!
//! Deterministic stand-ins for the feed source, classifier and roster
//! platform. Unit and integration tests drive the engine through these
//! instead of live services.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::classifier::{Classifier, ClassifierError};
use crate::feed::{FeedSource, FetchError};
use crate::platform::{PlatformError, RosterPlatform};
use crate::types::{FeedEntry, Page, Queue, RosterMember};

/// Recover the inner value of a poisoned lock; test fakes never hold
/// invariants across a panic.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// Roster Platform
// ============================================================================

/// One recorded `add_queue_members` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMutation {
    pub queue_id: String,
    pub member_ids: Vec<String>,
}

/// Platform backed by in-memory groups and queues.
///
/// Group members are served sorted by name, like the live listing.
/// Mutations are recorded and applied as a set union per queue.
#[derive(Default)]
pub struct InMemoryPlatform {
    groups: Mutex<HashMap<String, Vec<RosterMember>>>,
    queues: Mutex<Vec<Queue>>,
    queue_members: Mutex<HashMap<String, Vec<String>>>,
    mutations: Mutex<Vec<RecordedMutation>>,
    page_requests: AtomicUsize,
    mutation_attempts: AtomicUsize,
    failing_page: Mutex<Option<u32>>,
    fail_mutations: AtomicBool,
    mutation_delay: Mutex<Option<Duration>>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform with one group of `size` members named `Agent 000`, `Agent 001`, ...
    pub fn with_group(group_id: &str, size: usize) -> Self {
        let platform = Self::new();
        platform.insert_group(
            group_id,
            (0..size)
                .map(|i| RosterMember::new(format!("user-{i:03}"), format!("Agent {i:03}")))
                .collect(),
        );
        platform
    }

    /// Platform with `count` queues `queue-000`, `queue-001`, ...
    pub fn with_queues(count: usize) -> Self {
        let platform = Self::new();
        *lock(&platform.queues) = (0..count)
            .map(|i| Queue {
                id: format!("queue-{i:03}"),
                name: format!("Queue {i:03}"),
            })
            .collect();
        platform
    }

    pub fn insert_group(&self, group_id: &str, mut members: Vec<RosterMember>) {
        members.sort_by(|a, b| a.name.cmp(&b.name));
        lock(&self.groups).insert(group_id.to_string(), members);
    }

    /// Make every request for `page` fail.
    pub fn fail_page(&self, page: u32) {
        *lock(&self.failing_page) = Some(page);
    }

    pub fn fail_mutations(&self) {
        self.fail_mutations.store(true, Ordering::SeqCst);
    }

    pub fn delay_mutations(&self, delay: Duration) {
        *lock(&self.mutation_delay) = Some(delay);
    }

    pub fn mutations(&self) -> Vec<RecordedMutation> {
        lock(&self.mutations).clone()
    }

    pub fn mutation_attempts(&self) -> usize {
        self.mutation_attempts.load(Ordering::SeqCst)
    }

    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::SeqCst)
    }

    /// Current member ids of a queue, in insertion order.
    pub fn queue_members(&self, queue_id: &str) -> Vec<String> {
        lock(&self.queue_members).get(queue_id).cloned().unwrap_or_default()
    }

    fn check_page(&self, page_number: u32) -> Result<(), PlatformError> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);
        if *lock(&self.failing_page) == Some(page_number) {
            return Err(PlatformError::Rejected(format!("page {page_number} unavailable")));
        }
        Ok(())
    }
}

fn slice_page<T: Clone>(all: &[T], page_number: u32, page_size: u32) -> Page<T> {
    let start = (page_number.saturating_sub(1) as usize).saturating_mul(page_size as usize);
    Page {
        items: all.iter().skip(start).take(page_size as usize).cloned().collect(),
        total: all.len() as u64,
    }
}

#[async_trait]
impl RosterPlatform for InMemoryPlatform {
    async fn list_group_members(
        &self,
        group_id: &str,
        page_number: u32,
        page_size: u32,
    ) -> Result<Page<RosterMember>, PlatformError> {
        self.check_page(page_number)?;
        let groups = lock(&self.groups);
        let members = groups
            .get(group_id)
            .ok_or_else(|| PlatformError::Rejected(format!("group {group_id} not found")))?;
        Ok(slice_page(members, page_number, page_size))
    }

    async fn list_queues(&self, page_number: u32, page_size: u32) -> Result<Page<Queue>, PlatformError> {
        self.check_page(page_number)?;
        Ok(slice_page(&lock(&self.queues), page_number, page_size))
    }

    async fn add_queue_members(&self, queue_id: &str, members: &[RosterMember]) -> Result<(), PlatformError> {
        self.mutation_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *lock(&self.mutation_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(PlatformError::Rejected("queue is locked".into()));
        }

        let member_ids: Vec<String> = members.iter().map(|m| m.id.clone()).collect();
        {
            let mut queues = lock(&self.queue_members);
            let current = queues.entry(queue_id.to_string()).or_default();
            for id in &member_ids {
                if !current.contains(id) {
                    current.push(id.clone());
                }
            }
        }
        lock(&self.mutations).push(RecordedMutation {
            queue_id: queue_id.to_string(),
            member_ids,
        });
        Ok(())
    }

    fn platform_name(&self) -> &str {
        "in-memory"
    }
}

// ============================================================================
// Feed Source
// ============================================================================

/// Feed source that replays a scripted sequence of fetch results.
///
/// Once the script is exhausted the last result repeats.
#[derive(Default)]
pub struct ScriptedFeed {
    script: Mutex<VecDeque<Result<Vec<FeedEntry>, String>>>,
    last: Mutex<Option<Result<Vec<FeedEntry>, String>>>,
    fetches: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_entries(&self, entries: Vec<FeedEntry>) -> &Self {
        lock(&self.script).push_back(Ok(entries));
        self
    }

    pub fn push_failure(&self, message: &str) -> &Self {
        lock(&self.script).push_back(Err(message.to_string()));
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    async fn fetch_entries(&self, _url: &str) -> Result<Vec<FeedEntry>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let next = lock(&self.script).pop_front();
        let result = match next {
            Some(result) => {
                *lock(&self.last) = Some(result.clone());
                result
            }
            None => lock(&self.last).clone().unwrap_or_else(|| Ok(Vec::new())),
        };
        result.map_err(FetchError::Parse)
    }

    fn source_name(&self) -> &str {
        "scripted"
    }
}

/// `count` entries with stable identifiers `https://news.test/{prefix}/{i}`.
pub fn sample_entries(prefix: &str, count: usize) -> Vec<FeedEntry> {
    (0..count)
        .map(|i| {
            FeedEntry::new(
                format!("https://news.test/{prefix}/{i}"),
                format!("{prefix} headline {i}"),
                format!("{prefix} body {i}"),
            )
        })
        .collect()
}

// ============================================================================
// Classifier
// ============================================================================

/// Classifier returning canned replies and recording the prompts it saw.
#[derive(Default)]
pub struct CannedClassifier {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl CannedClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: impl Into<String>) -> &Self {
        lock(&self.replies).push_back(Ok(reply.into()));
        self
    }

    pub fn push_failure(&self, message: &str) -> &Self {
        lock(&self.replies).push_back(Err(message.to_string()));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl Classifier for CannedClassifier {
    async fn propose_classification(&self, prompt: &str) -> Result<String, ClassifierError> {
        lock(&self.prompts).push(prompt.to_string());
        match lock(&self.replies).pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(ClassifierError::Request(message)),
            None => Err(ClassifierError::EmptyResponse),
        }
    }

    fn model_name(&self) -> &str {
        "canned"
    }
}

/// A well-formed classifier reply with one block per `(topic, location, importance)`.
pub fn numbered_reply(blocks: &[(&str, Option<&str>, &str)]) -> String {
    blocks
        .iter()
        .enumerate()
        .map(|(i, (topic, location, importance))| {
            let location = match location {
                Some(loc) => format!("\"{loc}\""),
                None => "null".to_string(),
            };
            format!(
                "{}. {{\"topic\": \"{topic}\", \"location\": {location}, \"importance\": \"{importance}\"}}",
                i + 1
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
