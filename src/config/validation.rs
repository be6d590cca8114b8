//! Config validation: unknown-key detection with Levenshtein suggestions.
//!
//! Known keys are taken from `EngineConfig` itself by serializing a fully
//! populated sample, so a new field is recognised as soon as it exists. The
//! raw TOML is walked (including `[[array]]` entries) and every key outside
//! that set is reported with a "did you mean?" hint. Warnings never block
//! loading.

use std::collections::HashSet;

use super::{DispatchRule, EngineConfig, FeedDescriptor};
use crate::types::Importance;

/// A key in the config file that `EngineConfig` does not define.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKey {
    /// Dotted path; entries of `[[array]]` tables use the array's path.
    pub path: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for UnknownKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown config key '{}'", self.path)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Config with every optional field and array populated once.
fn schema_sample() -> EngineConfig {
    let mut sample = EngineConfig::default();
    sample.pools.default = Some(String::new());
    sample.feeds.catalogue.push(FeedDescriptor {
        name: String::new(),
        url: String::new(),
    });
    sample.dispatch.rules.push(DispatchRule {
        topic: String::new(),
        min_importance: Importance::default(),
        location_contains: Some(String::new()),
        category: String::new(),
        queue_id: String::new(),
    });
    sample
}

/// Every dotted key path `EngineConfig` accepts.
pub fn known_config_keys() -> HashSet<String> {
    match toml::Value::try_from(schema_sample()) {
        Ok(value) => config_key_paths(&value, "")
            .into_iter()
            .filter(|key| !is_dynamic_child(key))
            .collect(),
        Err(e) => {
            tracing::debug!(error = %e, "Could not serialize config schema");
            HashSet::new()
        }
    }
}

/// Tables whose child keys are user data (severity labels, category names).
const DYNAMIC_TABLES: &[&str] = &["severity", "pools.categories"];

fn is_dynamic_child(key: &str) -> bool {
    DYNAMIC_TABLES
        .iter()
        .any(|table| key.strip_prefix(table).is_some_and(|rest| rest.starts_with('.')))
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Dotted key paths of a config tree. Tables inside arrays (the feed
/// catalogue, dispatch rules) contribute their keys under the array's path,
/// so `[[dispatch.rules]] topic` yields `dispatch.rules.topic`.
fn config_key_paths(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let Some(table) = value.as_table() else {
        return keys;
    };
    for (k, v) in table {
        let path = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        keys.push(path.clone());
        match v {
            toml::Value::Table(_) => keys.extend(config_key_paths(v, &path)),
            toml::Value::Array(items) => {
                for item in items.iter().filter(|i| i.is_table()) {
                    keys.extend(config_key_paths(item, &path));
                }
            }
            _ => {}
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<String>) -> Option<String> {
    known
        .iter()
        .map(|k| (k.as_str(), levenshtein(unknown, k)))
        .filter(|&(_, dist)| dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Parse errors are left to the serde pass.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<UnknownKey> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let known = known_config_keys();
    if known.is_empty() {
        return Vec::new();
    }

    let mut reported = HashSet::new();
    config_key_paths(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key) && !is_dynamic_child(key))
        .filter(|key| reported.insert(key.clone()))
        .map(|path| UnknownKey {
            suggestion: suggest_correction(&path, &known),
            path,
        })
        .collect()
}
