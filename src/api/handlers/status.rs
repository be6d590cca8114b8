//! Liveness endpoint

use axum::extract::State;
use axum::response::Response;
use chrono::Utc;
use serde::Serialize;

use super::ApiState;
use crate::api::envelope::ApiResponse;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: i64,
    /// Revision of the broadcaster's latest set (0 = nothing published yet)
    pub feed_revision: u64,
    pub feed_entries: usize,
    pub classifier_model: String,
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> Response {
    let (feed_revision, feed_entries) = {
        let snapshot = state.feed_updates.borrow();
        (snapshot.revision, snapshot.entries.len())
    };

    ApiResponse::ok(HealthResponse {
        status: "ok",
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        feed_revision,
        feed_entries,
        classifier_model: state.pipeline.model_name().to_string(),
    })
}
