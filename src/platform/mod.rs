//! Operational platform access
//!
//! The decision engine only needs three platform capabilities: list a reserve
//! group's members, list routing queues, and add members to a queue. They sit
//! behind [`RosterPlatform`] so the escalation path can run against an
//! in-memory platform in tests.
//!
//! - **CloudPlatform**: REST client with OAuth client-credentials login

pub mod cloud;

pub use cloud::{CloudPlatform, CloudPlatformConfig};

use async_trait::async_trait;

use crate::types::{Page, Queue, RosterMember};

/// Platform call failures.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("platform returned status {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },
    #[error("platform call timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("platform not configured: {0}")]
    NotConfigured(String),
    #[error("platform rejected request: {0}")]
    Rejected(String),
}

/// Roster operations consumed by the escalation engine.
#[async_trait]
pub trait RosterPlatform: Send + Sync {
    /// One page of a reserve group's members, ascending by name.
    async fn list_group_members(
        &self,
        group_id: &str,
        page_number: u32,
        page_size: u32,
    ) -> Result<Page<RosterMember>, PlatformError>;

    /// One page of routing queues.
    async fn list_queues(&self, page_number: u32, page_size: u32) -> Result<Page<Queue>, PlatformError>;

    /// Add `members` to a queue. Never removes existing members.
    async fn add_queue_members(&self, queue_id: &str, members: &[RosterMember]) -> Result<(), PlatformError>;

    /// Human-readable name for logging.
    fn platform_name(&self) -> &str;
}

/// Stand-in used when no platform credentials are configured; every call
/// fails with [`PlatformError::NotConfigured`].
pub struct UnconfiguredPlatform {
    reason: String,
}

impl UnconfiguredPlatform {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    fn error(&self) -> PlatformError {
        PlatformError::NotConfigured(self.reason.clone())
    }
}

#[async_trait]
impl RosterPlatform for UnconfiguredPlatform {
    async fn list_group_members(&self, _: &str, _: u32, _: u32) -> Result<Page<RosterMember>, PlatformError> {
        Err(self.error())
    }

    async fn list_queues(&self, _: u32, _: u32) -> Result<Page<Queue>, PlatformError> {
        Err(self.error())
    }

    async fn add_queue_members(&self, _: &str, _: &[RosterMember]) -> Result<(), PlatformError> {
        Err(self.error())
    }

    fn platform_name(&self) -> &str {
        "unconfigured"
    }
}
