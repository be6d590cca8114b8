//! REST + WebSocket API using Axum
//!
//! A thin adapter over the engine's operations: feed catalogue and contents,
//! batch classification, roster escalation and live feed updates.

pub mod envelope;
pub mod handlers;
mod routes;
mod ws;

pub use handlers::ApiState;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::defaults::{CORS_ORIGINS_ENV, MAX_REQUEST_BODY_BYTES};

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `SURGE_CORS_ORIGINS` to a comma-separated list of allowed origins
/// (e.g. `http://localhost:3000` for a dashboard dev server).
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match std::env::var(CORS_ORIGINS_ENV) {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .nest("/api", routes::api_routes(state.clone()))
        .merge(routes::root_routes(state))
        .fallback(|| async { envelope::ApiErrorResponse::not_found("no such route") })
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}
