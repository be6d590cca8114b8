//! Surge Roster - Automated Response Decision Engine
//!
//! Polls a news feed, classifies new entries and staffs routing queues from
//! reserve pools in proportion to severity.
//!
//! # Usage
//!
//! ```bash
//! # Serve the API, poll the default feed and (if enabled) auto-dispatch
//! surge-roster --config surge.toml
//!
//! # Validate a config file and print the effective settings
//! surge-roster --config surge.toml check-config
//!
//! # Fetch one feed and print its classification
//! surge-roster classify-once --url https://example.com/rss.xml
//! ```
//!
//! # Environment Variables
//!
//! - `SURGE_CONFIG`: Path to the TOML config (default: ./surge.toml)
//! - `SURGE_CORS_ORIGINS`: Comma-separated origins allowed by CORS
//! - `OPENAI_API_KEY`: Classifier API key (name configurable)
//! - `SURGE_PLATFORM_CLIENT_SECRET`: Roster platform client secret (name configurable)
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use surge_roster::api::{create_app, ApiState};
use surge_roster::classifier::{
    ClassificationPipeline, Classifier, OpenAiClassifier, UnconfiguredClassifier,
};
use surge_roster::config::{self, EngineConfig};
use surge_roster::dispatch::AutoDispatcher;
use surge_roster::feed::{FeedBroadcaster, FeedSnapshot, FeedSource, RssFeedSource};
use surge_roster::platform::{CloudPlatform, RosterPlatform, UnconfiguredPlatform};
use surge_roster::roster::EscalationCoordinator;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "surge-roster")]
#[command(about = "Automated Response Decision Engine")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML config file (overrides SURGE_CONFIG and ./surge.toml)
    #[arg(short, long, env = "SURGE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the server address (default: "0.0.0.0:8080")
    #[arg(short, long)]
    addr: Option<String>,

    /// Override the polled feed (catalogue name or URL)
    #[arg(long)]
    feed: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Validate the configuration and print the effective settings
    CheckConfig,
    /// Fetch one feed, classify every entry and print the result as JSON
    ClassifyOnce {
        /// Feed URL (default: the configured default feed)
        #[arg(long)]
        url: Option<String>,
    },
}

// ============================================================================
// Task Supervision
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    FeedBroadcaster,
    AutoDispatcher,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::FeedBroadcaster => write!(f, "FeedBroadcaster"),
            TaskName::AutoDispatcher => write!(f, "AutoDispatcher"),
        }
    }
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(task_set: &mut JoinSet<Result<TaskName>>, cancel_token: CancellationToken) -> Result<()> {
    info!("Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("Supervisor: Task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("Supervisor: Task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("Supervisor: All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let the remaining tasks observe cancellation and finish.
    while let Some(result) = task_set.join_next().await {
        if let Ok(Ok(task_name)) = result {
            info!("Supervisor: Task {} stopped", task_name);
        }
    }

    Ok(())
}

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

// ============================================================================
// Component Construction
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }
}

fn load_config(args: &CliArgs) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::load(),
    };
    if let Some(addr) = &args.addr {
        config.server.addr = addr.clone();
    }
    if let Some(feed) = &args.feed {
        config.feeds.default = feed.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn build_classifier(config: &EngineConfig) -> Arc<dyn Classifier> {
    match OpenAiClassifier::new(config.openai_settings()) {
        Ok(classifier) => {
            info!(model = %config.classifier.model, "Classifier: OpenAI-compatible endpoint");
            Arc::new(classifier)
        }
        Err(e) => {
            warn!(error = %e, "Classifier unavailable; /api/classify will answer 503");
            Arc::new(UnconfiguredClassifier::new(e.to_string()))
        }
    }
}

fn build_platform(config: &EngineConfig) -> Arc<dyn RosterPlatform> {
    match CloudPlatform::new(config.cloud_platform_config()) {
        Ok(platform) => {
            info!(region = %config.platform.region, "Roster platform configured");
            Arc::new(platform)
        }
        Err(e) => {
            warn!(error = %e, "Roster platform unavailable; escalations will fail");
            Arc::new(UnconfiguredPlatform::new(e.to_string()))
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

fn check_config(config: &EngineConfig) -> Result<()> {
    let rendered = config.to_toml().context("Failed to render configuration")?;
    println!("{rendered}");
    let missing = config.severity_policy().missing_levels();
    if missing.is_empty() {
        info!("Configuration OK");
    } else {
        warn!(missing = ?missing, "Configuration OK, but some severity levels have no staffing fraction");
    }
    Ok(())
}

async fn classify_once(config: &EngineConfig, url: Option<String>) -> Result<()> {
    let url = url
        .or_else(|| config.default_feed_url())
        .context("No feed URL given and no default feed configured")?;

    let source = RssFeedSource::new(Duration::from_secs(config.feeds.fetch_timeout_secs))?;
    let entries = source
        .fetch_entries(&url)
        .await
        .with_context(|| format!("Failed to fetch {url}"))?;
    info!(entries = entries.len(), url = %url, "Fetched feed");

    let classifier = OpenAiClassifier::new(config.openai_settings())?;
    let pipeline = ClassificationPipeline::new(Arc::new(classifier))
        .with_call_timeout(Duration::from_secs(config.classifier.timeout_secs));
    let articles: Vec<_> = entries.iter().map(|e| e.to_article()).collect();
    let classifications = pipeline
        .classify_in_batches(&articles, config.classifier.max_batch)
        .await?;

    let rows: Vec<_> = entries
        .iter()
        .zip(&classifications)
        .map(|(entry, c)| {
            serde_json::json!({
                "identifier": entry.identifier,
                "title": entry.title,
                "topic": c.topic,
                "location": c.location,
                "importance": c.importance,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

async fn serve(config: &EngineConfig, cancel_token: CancellationToken) -> Result<()> {
    let fetch_timeout = Duration::from_secs(config.feeds.fetch_timeout_secs);
    let feed_source = Arc::new(RssFeedSource::new(fetch_timeout)?);

    let classifier = build_classifier(config);
    let pipeline: Arc<ClassificationPipeline<dyn Classifier>> = Arc::new(
        ClassificationPipeline::new(classifier).with_call_timeout(Duration::from_secs(config.classifier.timeout_secs)),
    );

    let platform = build_platform(config);
    let coordinator: Arc<EscalationCoordinator<dyn RosterPlatform>> = Arc::new(
        EscalationCoordinator::new(platform, config.severity_policy(), config.pool_directory())
            .with_paginator(config.paginator())
            .with_call_timeout(Duration::from_secs(config.platform.call_timeout_secs)),
    );

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    // Without a feed the idle sender is held here so subscribers never see a close.
    let (feed_updates, _idle_sender) = match config.default_feed_url() {
        Some(url) => {
            let broadcaster = FeedBroadcaster::new(Arc::clone(&feed_source), url.clone())
                .with_poll_interval(Duration::from_secs(config.feeds.poll_interval_secs))
                .with_fetch_timeout(fetch_timeout)
                .with_seen_capacity(config.feeds.seen_capacity);
            let updates = broadcaster.subscribe();
            info!(url = %url, interval_secs = config.feeds.poll_interval_secs, "Feed: polling");

            let cancel = cancel_token.clone();
            task_set.spawn(async move {
                broadcaster.run(cancel).await;
                Ok(TaskName::FeedBroadcaster)
            });
            (updates, None)
        }
        None => {
            warn!("No default feed configured; broadcaster disabled");
            let (tx, rx) = watch::channel(FeedSnapshot::unpublished(""));
            (rx, Some(tx))
        }
    };

    if config.dispatch.enabled {
        let dispatcher = AutoDispatcher::new(
            Arc::clone(&pipeline),
            Arc::clone(&coordinator),
            config.dispatch.rules.clone(),
        )
        .with_max_batch(config.classifier.max_batch)
        .with_seen_capacity(config.feeds.seen_capacity)
        .with_retry_interval(Duration::from_secs(config.dispatch.retry_interval_secs));
        let updates = feed_updates.clone();
        let cancel = cancel_token.clone();
        info!(rules = config.dispatch.rules.len(), "Auto-dispatch: enabled");
        task_set.spawn(async move {
            dispatcher.run(updates, cancel).await;
            Ok(TaskName::AutoDispatcher)
        });
    } else {
        info!("Auto-dispatch: disabled");
    }

    let state = ApiState {
        catalogue: Arc::new(config.feeds.catalogue.clone()),
        feed_source,
        pipeline,
        coordinator,
        feed_updates,
        started_at: chrono::Utc::now(),
    };

    let listener = tokio::net::TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.addr))?;
    info!("API listening on http://{}", config.server.addr);
    spawn_http_server(&mut task_set, listener, create_app(state), cancel_token.clone());

    run_supervisor(&mut task_set, cancel_token).await
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Secrets may live in a local .env file.
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();
    init_logging(args.log_json);

    let engine_config = load_config(&args)?;

    match args.command {
        Some(SubCommand::CheckConfig) => return check_config(&engine_config),
        Some(SubCommand::ClassifyOnce { url }) => return classify_once(&engine_config, url).await,
        None => {}
    }

    config::init(engine_config);

    info!("Surge Roster - Automated Response Decision Engine");

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    serve(config::get(), cancel_token).await?;

    info!("Surge Roster shutdown complete");
    Ok(())
}
