use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use connector::WebhookDispatcher;
use prometheus::Encoder;
use serde::Serialize;
use serde_json::json;
use tracing::instrument;

use crate::error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<WebhookDispatcher>,
    pub metrics_path: &'static str,
}

pub fn build_router(state: Arc<ApiState>) -> Router {
    let metrics_path: &'static str = state.metrics_path;
    Router::new()
        .route("/healthz", get(healthz))
        .route("/webhook", post(webhook))
        .route(metrics_path, get(metrics))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
struct WebhookResponse {
    written: usize,
}

/// Bitbucket delivery endpoint. The event name travels in the query string
/// the hook was registered with.
#[instrument(skip(state, body), fields(bytes = body.len()))]
async fn webhook(
    State(state): State<Arc<ApiState>>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    let query = query.unwrap_or_default();
    let written = state.dispatcher.dispatch(&query, &body).await?;
    Ok(Json(WebhookResponse { written }))
}

async fn metrics() -> ApiResult<impl IntoResponse> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let content_type = encoder.format_type().to_string();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok((
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, content_type)],
        buffer,
    ))
}
