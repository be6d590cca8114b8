//! API route definitions
//!
//! - /health - liveness
//! - /api/feeds, /api/rss, /api/feed/latest - feed catalogue and contents
//! - /api/classify - batch classification
//! - /api/escalations (alias /api/extragroup), /api/queues - roster escalation
//! - /ws - live feed updates

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, ApiState};
use super::ws;

/// Create all API routes
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/feeds", get(handlers::list_feeds))
        .route("/rss", get(handlers::fetch_rss))
        .route("/feed/latest", get(handlers::latest_feed))
        .route("/classify", post(handlers::classify))
        .route("/escalations", post(handlers::escalate))
        // Legacy name kept for existing dashboards
        .route("/extragroup", post(handlers::escalate))
        .route("/queues", get(handlers::list_queues))
        .with_state(state)
}

/// Root-level routes: health and the WebSocket endpoint
pub fn root_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}
