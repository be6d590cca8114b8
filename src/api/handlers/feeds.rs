//! Feed endpoints: catalogue, one-shot fetch, latest broadcast set

use axum::extract::{Query, State};
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::ApiState;
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::feed::FetchError;
use crate::types::FeedEntry;

/// GET /api/feeds
pub async fn list_feeds(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.catalogue.as_ref())
}

#[derive(Debug, Deserialize)]
pub struct RssQuery {
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RssResponse {
    pub url: String,
    pub entries: Vec<FeedEntry>,
}

/// GET /api/rss?url=...
pub async fn fetch_rss(State(state): State<ApiState>, Query(query): Query<RssQuery>) -> Response {
    let Some(url) = query.url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) else {
        return ApiErrorResponse::bad_request("missing 'url' query parameter");
    };
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return ApiErrorResponse::bad_request("'url' must be an http(s) URL");
    }

    match state.feed_source.fetch_entries(&url).await {
        Ok(entries) => ApiResponse::ok(RssResponse { url, entries }),
        Err(e) => {
            warn!(url = %url, error = %e, "One-shot feed fetch failed");
            let code = match e {
                FetchError::Xml(_) | FetchError::Parse(_) => "FEED_UNPARSEABLE",
                _ => "FEED_UNAVAILABLE",
            };
            ApiErrorResponse::bad_gateway(code, e.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LatestFeedResponse {
    pub source: String,
    pub revision: u64,
    pub fetched_at: Option<DateTime<Utc>>,
    pub entries: Vec<FeedEntry>,
}

/// GET /api/feed/latest
pub async fn latest_feed(State(state): State<ApiState>) -> Response {
    let snapshot = state.feed_updates.borrow().clone();
    ApiResponse::ok(LatestFeedResponse {
        source: snapshot.source,
        revision: snapshot.revision,
        fetched_at: snapshot.fetched_at,
        entries: snapshot.entries.as_ref().clone(),
    })
}
