//! Core data types shared across the decision engine
//!
//! Feed entries flow in from the broadcaster, classifications come out of the
//! alignment pipeline, and roster members / queues are transient snapshots of
//! the operational platform.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

// ============================================================================
// Feed Data
// ============================================================================

/// A single entry from a feed source.
///
/// `identifier` is the source-provided link (or guid) and is the only field
/// used for dedup. Entries are never mutated after they are fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub identifier: String,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
}

impl FeedEntry {
    pub fn new(identifier: impl Into<String>, title: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            title: title.into(),
            snippet: snippet.into(),
            published: None,
        }
    }

    /// The classifier-facing view of this entry.
    pub fn to_article(&self) -> ArticleInput {
        ArticleInput {
            title: self.title.clone(),
            content: self.snippet.clone(),
        }
    }
}

/// One article submitted for classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleInput {
    pub title: String,
    #[serde(default)]
    pub content: String,
}

// ============================================================================
// Classification
// ============================================================================

/// Importance (severity) assigned by the classifier.
///
/// Ordered so that `Critical > High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Importance {
    #[default]
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Importance {
    /// Every level the classifier can emit, lowest first.
    pub const ALL: [Importance; 4] = [
        Importance::Low,
        Importance::Medium,
        Importance::High,
        Importance::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Low => "LOW",
            Importance::Medium => "MEDIUM",
            Importance::High => "HIGH",
            Importance::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known importance level.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown importance level '{0}' (expected CRITICAL, HIGH, MEDIUM or LOW)")]
pub struct UnknownImportance(pub String);

impl FromStr for Importance {
    type Err = UnknownImportance;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(Importance::Critical),
            "HIGH" => Ok(Importance::High),
            "MEDIUM" => Ok(Importance::Medium),
            "LOW" => Ok(Importance::Low),
            _ => Err(UnknownImportance(s.to_string())),
        }
    }
}

impl Serialize for Importance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Importance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Topic assigned by the classifier.
///
/// Unknown labels are kept verbatim in `Other` rather than rejected; the
/// classifier is free text and new topics should not fail a whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Finance,
    InternationalRelations,
    Disaster,
    Environment,
    Other(String),
}

impl Topic {
    pub fn parse_lenient(raw: &str) -> Self {
        let normalized: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "finance" | "financial" | "economy" => Topic::Finance,
            "internationalrelations" | "internationalrelationships" | "internationalrelation" => {
                Topic::InternationalRelations
            }
            "disaster" | "disasters" => Topic::Disaster,
            "environment" | "environmental" => Topic::Environment,
            _ => Topic::Other(raw.trim().to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Topic::Finance => "Finance",
            Topic::InternationalRelations => "International Relations",
            Topic::Disaster => "Disaster",
            Topic::Environment => "Environment",
            Topic::Other(label) => label,
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Topic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Topic::parse_lenient(&raw))
    }
}

/// Structured classification of one feed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub topic: Topic,
    /// Empty when the classifier did not name a location.
    pub location: String,
    pub importance: Importance,
}

// ============================================================================
// Roster Platform
// ============================================================================

/// One person in a reserve pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterMember {
    pub id: String,
    pub name: String,
}

impl RosterMember {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// An operational routing queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queue {
    pub id: String,
    pub name: String,
}

/// One page of a paginated platform listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages, as reported by the platform.
    pub total: u64,
}

/// A request to staff `queue_id` from the reserve pool mapped to `category`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRequest {
    pub category: String,
    pub severity: Importance,
    #[serde(rename = "queueId", alias = "queue_id")]
    pub queue_id: String,
}
