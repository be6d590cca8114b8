//! Batch classification endpoint

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::ApiState;
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::classifier::{ClassifierError, ClassifyError};
use crate::types::{ArticleInput, Importance, Topic};

#[derive(Debug, Serialize)]
pub struct ClassifiedArticle {
    /// 1-based position of the article in the request
    pub id: usize,
    pub topic: Topic,
    pub location: String,
    pub importance: Importance,
}

#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub classification: Vec<ClassifiedArticle>,
}

/// POST /api/classify `{ "articles": [{ "title": ..., "content": ... }] }`
pub async fn classify(State(state): State<ApiState>, body: Result<Json<Value>, JsonRejection>) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return ApiErrorResponse::bad_request(rejection.body_text()),
    };

    let articles = match parse_articles(&body) {
        Ok(articles) => articles,
        Err(msg) => return ApiErrorResponse::bad_request(msg),
    };

    match state.pipeline.classify(&articles).await {
        Ok(classifications) => ApiResponse::ok(ClassifyResponse {
            classification: classifications
                .into_iter()
                .enumerate()
                .map(|(i, c)| ClassifiedArticle {
                    id: i + 1,
                    topic: c.topic,
                    location: c.location,
                    importance: c.importance,
                })
                .collect(),
        }),
        Err(ClassifyError::Classifier(ClassifierError::NotConfigured(msg))) => {
            ApiErrorResponse::service_unavailable(format!("classifier not configured: {msg}"))
        }
        Err(ClassifyError::Classifier(e)) => {
            warn!(articles = articles.len(), error = %e, "Classification request failed");
            ApiErrorResponse::bad_gateway("CLASSIFIER_ERROR", e.to_string())
        }
        Err(ClassifyError::Alignment(e)) => ApiErrorResponse::bad_gateway("CLASSIFIER_MISALIGNED", e.to_string()),
    }
}

fn parse_articles(body: &Value) -> Result<Vec<ArticleInput>, String> {
    let Some(items) = body.get("articles").and_then(Value::as_array) else {
        return Err("'articles' must be an array".to_string());
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value::<ArticleInput>(item.clone())
                .map_err(|e| format!("articles[{i}] is not a valid article: {e}"))
        })
        .collect()
}
