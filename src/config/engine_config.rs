//! Engine Configuration - every tunable of the decision engine as TOML
//!
//! Each section implements `Default` from `config::defaults`, so a missing
//! file or a partial file behaves exactly like the built-in values.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use crate::classifier::OpenAiSettings;
use crate::platform::CloudPlatformConfig;
use crate::roster::{Paginator, PoolDirectory, SeverityPolicy};
use crate::types::Importance;

/// Environment variable pointing at the config file.
pub const CONFIG_PATH_ENV: &str = "SURGE_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "surge.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration.
///
/// Load with `EngineConfig::load()` which searches:
/// 1. `$SURGE_CONFIG` env var
/// 2. `./surge.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub feeds: FeedsConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub platform: PlatformConfig,

    /// Severity label → fraction of the reserve pool to activate.
    #[serde(default = "default_severity")]
    pub severity: BTreeMap<String, f64>,

    #[serde(default)]
    pub pools: PoolsConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            feeds: FeedsConfig::default(),
            classifier: ClassifierConfig::default(),
            platform: PlatformConfig::default(),
            severity: default_severity(),
            pools: PoolsConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$SURGE_CONFIG` environment variable
    /// 2. `./surge.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded engine config from {CONFIG_PATH_ENV}");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {CONFIG_PATH_ENV}, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{CONFIG_PATH_ENV} points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded engine config from ./{LOCAL_CONFIG_FILE}");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{LOCAL_CONFIG_FILE}, using defaults");
                }
            }
        }

        info!("No {LOCAL_CONFIG_FILE} found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config = Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })?;
        Ok(config)
    }

    /// Parse, warn about unknown keys, and validate.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;

        let missing = config.severity_policy().missing_levels();
        if !missing.is_empty() {
            let levels: Vec<&str> = missing.iter().map(Importance::as_str).collect();
            warn!(
                missing = %levels.join(", "),
                "No staffing fraction for some severity levels; escalations at those levels will fail"
            );
        }
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate ranges and cross-references.
    ///
    /// All problems are collected so one run reports every mistake.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.server.addr.parse::<SocketAddr>().is_err() {
            errors.push(format!("server.addr = '{}' is not a valid socket address", self.server.addr));
        }

        // Feeds
        check_min_secs(self.feeds.poll_interval_secs, "feeds.poll_interval_secs", &mut errors);
        check_min_secs(self.feeds.fetch_timeout_secs, "feeds.fetch_timeout_secs", &mut errors);
        if self.feeds.seen_capacity == 0 {
            errors.push("feeds.seen_capacity must be at least 1".to_string());
        }
        for feed in &self.feeds.catalogue {
            if !is_http_url(&feed.url) {
                errors.push(format!("feeds.catalogue '{}' has non-http(s) url '{}'", feed.name, feed.url));
            }
        }
        if !self.feeds.default.is_empty() && self.default_feed_url().is_none() {
            errors.push(format!(
                "feeds.default = '{}' is neither a catalogue name nor an http(s) URL",
                self.feeds.default
            ));
        }

        // Classifier
        check_min_secs(self.classifier.timeout_secs, "classifier.timeout_secs", &mut errors);
        if self.classifier.max_batch == 0 {
            errors.push("classifier.max_batch must be at least 1".to_string());
        }
        if !(0.0..=2.0).contains(&self.classifier.temperature) {
            errors.push(format!(
                "classifier.temperature = {} is outside [0, 2]",
                self.classifier.temperature
            ));
        }

        // Platform
        if self.platform.page_size == 0 || self.platform.page_size > defaults::MAX_PAGE_SIZE {
            errors.push(format!(
                "platform.page_size = {} must be within 1..={}",
                self.platform.page_size,
                defaults::MAX_PAGE_SIZE
            ));
        }
        if self.platform.max_concurrent_pages == 0 {
            errors.push("platform.max_concurrent_pages must be at least 1".to_string());
        }
        check_min_secs(self.platform.call_timeout_secs, "platform.call_timeout_secs", &mut errors);

        // Severity table; labels are case-insensitive, so `critical` and `CRITICAL` collide.
        let mut levels: HashMap<Importance, &str> = HashMap::new();
        for (label, fraction) in &self.severity {
            match label.parse::<Importance>() {
                Ok(level) => {
                    if let Some(previous) = levels.insert(level, label) {
                        errors.push(format!(
                            "severity.{label} duplicates severity.{previous} ({} is configured twice)",
                            level.as_str()
                        ));
                    }
                }
                Err(_) => errors.push(format!(
                    "severity.{label} is not a severity level (expected CRITICAL, HIGH, MEDIUM or LOW)"
                )),
            }
            if !(0.0..=1.0).contains(fraction) {
                errors.push(format!("severity.{label} = {fraction} is outside [0, 1]"));
            }
        }

        // Pools
        for (category, pool) in &self.pools.categories {
            if pool.trim().is_empty() {
                errors.push(format!("pools.categories.{category} maps to an empty group id"));
            }
        }

        // Dispatch rules
        check_min_secs(self.dispatch.retry_interval_secs, "dispatch.retry_interval_secs", &mut errors);
        for (i, rule) in self.dispatch.rules.iter().enumerate() {
            if rule.queue_id.trim().is_empty() {
                errors.push(format!("dispatch.rules[{i}] has an empty queue_id"));
            }
            if rule.category.trim().is_empty() {
                errors.push(format!("dispatch.rules[{i}] has an empty category"));
            }
        }
        if self.dispatch.enabled && self.dispatch.rules.is_empty() {
            warn!("dispatch.enabled is set but no dispatch rules are configured");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// URL of the default feed: a catalogue entry by name, or a literal URL.
    pub fn default_feed_url(&self) -> Option<String> {
        let default = self.feeds.default.trim();
        if let Some(feed) = self.feeds.catalogue.iter().find(|f| f.name == default) {
            return Some(feed.url.clone());
        }
        is_http_url(default).then(|| default.to_string())
    }

    // ------------------------------------------------------------------------
    // Component settings
    // ------------------------------------------------------------------------

    /// Severity table keyed by level. Unparseable labels are skipped
    /// (`validate` rejects them).
    pub fn severity_policy(&self) -> SeverityPolicy {
        SeverityPolicy::new(
            self.severity
                .iter()
                .filter_map(|(label, fraction)| label.parse::<Importance>().ok().map(|level| (level, *fraction)))
                .collect(),
        )
    }

    pub fn pool_directory(&self) -> PoolDirectory {
        PoolDirectory::new(self.pools.categories.clone(), self.pools.default.clone())
    }

    pub fn paginator(&self) -> Paginator {
        Paginator::new(self.platform.page_size).with_concurrency(self.platform.max_concurrent_pages)
    }

    /// Classifier settings; the API key is read from the configured env var.
    pub fn openai_settings(&self) -> OpenAiSettings {
        OpenAiSettings {
            base_url: self.classifier.base_url.clone(),
            model: self.classifier.model.clone(),
            api_key: std::env::var(&self.classifier.api_key_env).unwrap_or_default(),
            temperature: self.classifier.temperature,
            timeout: Duration::from_secs(self.classifier.timeout_secs),
        }
    }

    /// Platform settings; the client secret is read from the configured env var.
    pub fn cloud_platform_config(&self) -> CloudPlatformConfig {
        let secret = std::env::var(&self.platform.client_secret_env).unwrap_or_default();
        CloudPlatformConfig::for_region(
            &self.platform.region,
            &self.platform.client_id,
            &secret,
            Duration::from_secs(self.platform.call_timeout_secs),
        )
    }
}

fn check_min_secs(value: u64, name: &str, errors: &mut Vec<String>) {
    if value < 1 {
        errors.push(format!("{name} must be at least 1 second"));
    }
}

fn is_http_url(s: &str) -> bool {
    (s.starts_with("http://") || s.starts_with("https://")) && s.len() > "https://".len()
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String {
    defaults::DEFAULT_SERVER_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

/// One named feed in the catalogue served by `/api/feeds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedDescriptor {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedsConfig {
    /// Catalogue name or literal URL of the feed the broadcaster polls.
    #[serde(default)]
    pub default: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_seen_capacity")]
    pub seen_capacity: usize,

    #[serde(default)]
    pub catalogue: Vec<FeedDescriptor>,
}

fn default_poll_interval() -> u64 { defaults::FEED_POLL_INTERVAL_SECS }
fn default_fetch_timeout() -> u64 { defaults::FEED_FETCH_TIMEOUT_SECS }
fn default_seen_capacity() -> usize { defaults::SEEN_IDENTIFIER_CAPACITY }

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            default: String::new(),
            poll_interval_secs: default_poll_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
            seen_capacity: default_seen_capacity(),
            catalogue: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_base_url")]
    pub base_url: String,

    #[serde(default = "default_classifier_model")]
    pub model: String,

    /// Name of the env var holding the API key (never the key itself).
    #[serde(default = "default_classifier_key_env")]
    pub api_key_env: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
}

fn default_classifier_base_url() -> String { defaults::DEFAULT_CLASSIFIER_BASE_URL.to_string() }
fn default_classifier_model() -> String { defaults::DEFAULT_CLASSIFIER_MODEL.to_string() }
fn default_classifier_key_env() -> String { defaults::CLASSIFIER_API_KEY_ENV.to_string() }
fn default_max_batch() -> usize { defaults::CLASSIFIER_MAX_BATCH }
fn default_classifier_timeout() -> u64 { defaults::CLASSIFIER_CALL_TIMEOUT_SECS }

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: default_classifier_base_url(),
            model: default_classifier_model(),
            api_key_env: default_classifier_key_env(),
            temperature: 0.0,
            max_batch: default_max_batch(),
            timeout_secs: default_classifier_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Region host, e.g. `mypurecloud.com` or `mypurecloud.ie`.
    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub client_id: String,

    /// Name of the env var holding the OAuth client secret.
    #[serde(default = "default_secret_env")]
    pub client_secret_env: String,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_concurrent_pages")]
    pub max_concurrent_pages: usize,

    #[serde(default = "default_platform_timeout")]
    pub call_timeout_secs: u64,
}

fn default_region() -> String { defaults::DEFAULT_PLATFORM_REGION.to_string() }
fn default_secret_env() -> String { defaults::PLATFORM_CLIENT_SECRET_ENV.to_string() }
fn default_page_size() -> u32 { defaults::DEFAULT_PAGE_SIZE }
fn default_concurrent_pages() -> usize { 1 }
fn default_platform_timeout() -> u64 { defaults::PLATFORM_CALL_TIMEOUT_SECS }

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            client_id: String::new(),
            client_secret_env: default_secret_env(),
            page_size: default_page_size(),
            max_concurrent_pages: default_concurrent_pages(),
            call_timeout_secs: default_platform_timeout(),
        }
    }
}

fn default_severity() -> BTreeMap<String, f64> {
    defaults::DEFAULT_SEVERITY_FRACTIONS
        .iter()
        .map(|(label, fraction)| (label.to_string(), *fraction))
        .collect()
}

/// Category → reserve group mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolsConfig {
    /// Group used for categories with no explicit mapping. Unset means
    /// unmapped categories are a no-op.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    #[serde(default)]
    pub categories: HashMap<String, String>,
}

/// Automatic escalation from classified feed entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Retry delay for entries whose classification failed while the feed is steady.
    #[serde(default = "default_dispatch_retry")]
    pub retry_interval_secs: u64,

    #[serde(default)]
    pub rules: Vec<DispatchRule>,
}

fn default_dispatch_retry() -> u64 { defaults::DISPATCH_RETRY_INTERVAL_SECS }

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            retry_interval_secs: default_dispatch_retry(),
            rules: Vec::new(),
        }
    }
}

/// When a classification matches, escalate `queue_id` from the pool of `category`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRule {
    /// Topic label, or `*` for any topic.
    pub topic: String,

    #[serde(default = "default_min_importance")]
    pub min_importance: Importance,

    /// Case-insensitive substring the classified location must contain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_contains: Option<String>,

    pub category: String,

    pub queue_id: String,
}

fn default_min_importance() -> Importance {
    Importance::High
}
