//! System-wide default constants.
//!
//! Grouped by subsystem. `EngineConfig` defaults are built from these so the
//! engine behaves identically with no config file present.

// ============================================================================
// Server
// ============================================================================

/// Default HTTP bind address.
pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:8080";

/// Environment variable holding the comma-separated CORS allow-list.
pub const CORS_ORIGINS_ENV: &str = "SURGE_CORS_ORIGINS";

/// Maximum accepted request body (bytes). Classification batches are the
/// largest payloads.
pub const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

// ============================================================================
// Feed Broadcaster
// ============================================================================

/// Interval between feed polls (seconds). 300 = 5 minutes.
pub const FEED_POLL_INTERVAL_SECS: u64 = 300;

/// Deadline for one feed fetch (seconds).
pub const FEED_FETCH_TIMEOUT_SECS: u64 = 15;

/// Identifiers remembered for new-entry detection before the oldest is evicted.
pub const SEEN_IDENTIFIER_CAPACITY: usize = 1_000;

/// Snippets longer than this are truncated (characters).
pub const SNIPPET_MAX_CHARS: usize = 500;

// ============================================================================
// Classifier
// ============================================================================

pub const DEFAULT_CLASSIFIER_BASE_URL: &str = "https://api.openai.com/v1";

pub const DEFAULT_CLASSIFIER_MODEL: &str = "gpt-3.5-turbo";

/// Environment variable holding the classifier API key.
pub const CLASSIFIER_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Deadline for one batch classification call (seconds).
pub const CLASSIFIER_CALL_TIMEOUT_SECS: u64 = 60;

/// Articles per classifier call when the dispatcher chunks new entries.
pub const CLASSIFIER_MAX_BATCH: usize = 20;

/// Delay before the dispatcher retries entries whose classification failed (seconds).
pub const DISPATCH_RETRY_INTERVAL_SECS: u64 = 60;

// ============================================================================
// Roster Platform
// ============================================================================

pub const DEFAULT_PLATFORM_REGION: &str = "mypurecloud.com";

/// Environment variable holding the OAuth client secret.
pub const PLATFORM_CLIENT_SECRET_ENV: &str = "SURGE_PLATFORM_CLIENT_SECRET";

/// Listing page size. Matches the platform's default page size.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Largest page size the platform accepts.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Deadline for one platform call (seconds).
pub const PLATFORM_CALL_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Staffing Policy
// ============================================================================

/// Default severity → pool fraction table.
pub const DEFAULT_SEVERITY_FRACTIONS: [(&str, f64); 4] = [
    ("CRITICAL", 0.5),
    ("HIGH", 0.3),
    ("MEDIUM", 0.15),
    ("LOW", 0.0),
];
