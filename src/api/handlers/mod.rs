//! API route handlers
//!
//! - feed catalogue, one-shot feed fetch and the broadcaster's latest set
//! - batch classification
//! - escalation and queue listing

mod classify;
mod feeds;
mod roster;
mod status;

pub use classify::*;
pub use feeds::*;
pub use roster::*;
pub use status::*;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::classifier::{ClassificationPipeline, Classifier};
use crate::config::FeedDescriptor;
use crate::feed::{FeedSnapshot, FeedSource};
use crate::platform::RosterPlatform;
use crate::roster::EscalationCoordinator;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Feeds listed by `/api/feeds`
    pub catalogue: Arc<Vec<FeedDescriptor>>,
    /// Used for one-shot `/api/rss` fetches
    pub feed_source: Arc<dyn FeedSource>,
    pub pipeline: Arc<ClassificationPipeline<dyn Classifier>>,
    pub coordinator: Arc<EscalationCoordinator<dyn RosterPlatform>>,
    /// Broadcaster output; cloned per WebSocket client
    pub feed_updates: watch::Receiver<FeedSnapshot>,
    pub started_at: DateTime<Utc>,
}
