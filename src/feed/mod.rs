//! Feed ingestion and change fan-out.
//!
//! Provides the [`FeedSource`] trait for pulling entries from a news feed,
//! the HTTP RSS/Atom implementation, and the polling [`FeedBroadcaster`]
//! that pushes the full entry set to subscribers whenever it changes.

use std::time::Duration;

use async_trait::async_trait;

use crate::types::FeedEntry;

pub mod broadcaster;
pub mod rss;

pub use broadcaster::{CycleOutcome, FeedBroadcaster, FeedSnapshot, SeenSet};
pub use rss::{parse_feed, RssFeedSource};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed {url} returned HTTP {status}")]
    Status { status: u16, url: String },
    #[error("feed fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed feed XML: {0}")]
    Xml(String),
    #[error("feed could not be parsed: {0}")]
    Parse(String),
}

/// Trait abstracting where feed entries come from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the current entries of the feed at `url`, in feed order.
    async fn fetch_entries(&self, url: &str) -> Result<Vec<FeedEntry>, FetchError>;

    /// Human-readable name for logging (e.g. "rss", "scripted").
    fn source_name(&self) -> &str;
}
