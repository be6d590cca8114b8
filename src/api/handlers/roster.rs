//! Escalation and queue endpoints

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::ApiState;
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::roster::{EscalationError, EscalationOutcome};
use crate::types::{EscalationRequest, Importance};

/// Body of a successful escalation response. No-ops report `status: "no_op"`.
#[derive(Debug, Serialize)]
pub struct EscalationResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    pub category: String,
    pub queue_id: String,
    pub severity: Importance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_size: Option<usize>,
    pub member_ids: Vec<String>,
}

impl EscalationResponse {
    fn from_outcome(request: &EscalationRequest, outcome: EscalationOutcome) -> Self {
        let base = |status: &'static str, reason: Option<&'static str>| Self {
            status,
            reason,
            category: request.category.clone(),
            queue_id: request.queue_id.clone(),
            severity: request.severity,
            pool_id: None,
            pool_size: None,
            member_ids: Vec::new(),
        };
        match outcome {
            EscalationOutcome::Applied {
                pool_id,
                pool_size,
                members,
                ..
            } => Self {
                pool_id: Some(pool_id),
                pool_size: Some(pool_size),
                member_ids: members.into_iter().map(|m| m.id).collect(),
                ..base("applied", None)
            },
            EscalationOutcome::NoPoolMapped { .. } => base("no_op", Some("no_pool_mapped")),
            EscalationOutcome::NothingSelected { pool_id, pool_size, .. } => Self {
                pool_id: Some(pool_id),
                pool_size: Some(pool_size),
                ..base("no_op", Some("nothing_selected"))
            },
        }
    }
}

/// POST /api/escalations (alias /api/extragroup)
/// `{ "category": ..., "severity": "CRITICAL", "queueId": ... }`
pub async fn escalate(State(state): State<ApiState>, body: Result<Json<Value>, JsonRejection>) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return ApiErrorResponse::bad_request(rejection.body_text()),
    };

    let request: EscalationRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => return ApiErrorResponse::bad_request(format!("invalid escalation request: {e}")),
    };
    if request.category.trim().is_empty() {
        return ApiErrorResponse::bad_request("'category' must not be empty");
    }
    if request.queue_id.trim().is_empty() {
        return ApiErrorResponse::bad_request("'queueId' must not be empty");
    }

    info!(
        category = %request.category,
        severity = %request.severity,
        queue_id = %request.queue_id,
        "Escalation requested"
    );

    match state.coordinator.escalate(&request).await {
        Ok(outcome) => ApiResponse::ok(EscalationResponse::from_outcome(&request, outcome)),
        Err(EscalationError::Config(e)) => ApiErrorResponse::config_error(e.to_string()),
        Err(e @ EscalationError::Pool { .. }) => {
            warn!(error = %e, "Escalation failed");
            ApiErrorResponse::bad_gateway("POOL_UNAVAILABLE", e.to_string())
        }
        Err(e @ EscalationError::Platform { .. }) => {
            warn!(error = %e, "Escalation failed");
            ApiErrorResponse::bad_gateway("PLATFORM_ERROR", e.to_string())
        }
    }
}

/// GET /api/queues
pub async fn list_queues(State(state): State<ApiState>) -> Response {
    match state.coordinator.queues().await {
        Ok(queues) => ApiResponse::ok(queues),
        Err(e) => {
            warn!(error = %e, "Queue listing failed");
            ApiErrorResponse::bad_gateway("PLATFORM_ERROR", e.to_string())
        }
    }
}
