//! Surge Roster: Automated Response Decision Engine
//!
//! Watches news feeds, classifies new entries with a generative classifier and
//! staffs routing queues from reserve pools in proportion to severity.
//!
//! ## Architecture
//!
//! - **Feed Broadcaster**: polls a feed, publishes the entry set on change
//! - **Classification Pipeline**: batch prompt, aligned reply parsing
//! - **Escalation Coordinator**: reserve pool aggregation, proportional staffing
//! - **Auto Dispatcher**: feed changes → classification → escalation rules
//! - **API**: REST + WebSocket adapter over the operations above

pub mod api;
pub mod classifier;
pub mod config;
pub mod dispatch;
pub mod feed;
pub mod platform;
pub mod roster;
pub mod testing;
pub mod types;

// Re-export configuration
pub use config::EngineConfig;

// Re-export commonly used types
pub use types::{
    ArticleInput, Classification, EscalationRequest, FeedEntry, Importance, Queue, RosterMember, Topic,
};

// Re-export engine components
pub use classifier::{ClassificationPipeline, Classifier, OpenAiClassifier};
pub use dispatch::AutoDispatcher;
pub use feed::{FeedBroadcaster, FeedSnapshot, FeedSource, RssFeedSource};
pub use platform::{CloudPlatform, RosterPlatform};
pub use roster::{EscalationCoordinator, EscalationOutcome, Paginator, PoolDirectory, SeverityPolicy};
