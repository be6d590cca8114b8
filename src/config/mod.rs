//! Engine Configuration Module
//!
//! Severity table, pool mapping, feed catalogue, collaborator settings and
//! dispatch rules, loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `SURGE_CONFIG` environment variable (path to TOML file)
//! 2. `surge.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! config::init(EngineConfig::load());
//! let page_size = config::get().platform.page_size;
//! ```
//!
//! Components take their settings by value at construction, so tests can
//! build them without touching the global.

mod engine_config;
pub mod defaults;
pub mod validation;

pub use engine_config::*;

use std::sync::OnceLock;

static ENGINE_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Initialize the global configuration. Later calls are ignored.
pub fn init(config: EngineConfig) {
    if ENGINE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global configuration.
///
/// Panics if `init()` has not been called; a missing config is a startup bug.
#[allow(clippy::expect_used)]
pub fn get() -> &'static EngineConfig {
    ENGINE_CONFIG
        .get()
        .expect("config::get() called before config::init()")
}
