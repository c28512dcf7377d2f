// Metric widget HTTP routes
// Upserts are broadcast to every live stream as metrics.upsert.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use flowly_core::events::MetricsUpsertData;
use flowly_core::Event;
use serde_json::Value;
use std::sync::Arc;

use super::common::{api_error, ApiError, ErrorResponse, ListResponse};
use crate::services::MetricsRegistry;

/// App state for metric routes
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<MetricsRegistry>,
}

impl AppState {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self { metrics }
    }
}

/// Create metric routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/metrics", get(list_metrics))
        .route("/v1/metrics/:metric_id", post(upsert_metric))
        .with_state(state)
}

/// GET /v1/metrics - Registered metric specs
#[utoipa::path(
    get,
    path = "/v1/metrics",
    responses(
        (status = 200, description = "Registered metrics", body = ListResponse<MetricsUpsertData>)
    ),
    tag = "metrics"
)]
pub async fn list_metrics(State(state): State<AppState>) -> Json<ListResponse<MetricsUpsertData>> {
    Json(ListResponse::new(state.metrics.list()))
}

/// POST /v1/metrics/{metric_id} - Create or replace a metric spec
#[utoipa::path(
    post,
    path = "/v1/metrics/{metric_id}",
    params(
        ("metric_id" = String, Path, description = "Metric ID")
    ),
    request_body(content = Object, description = "Renderable spec: {root, elements}"),
    responses(
        (status = 200, description = "Published metrics.upsert event", body = Event),
        (status = 400, description = "Malformed spec", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "metrics"
)]
pub async fn upsert_metric(
    State(state): State<AppState>,
    Path(metric_id): Path<String>,
    Json(spec): Json<Value>,
) -> Result<Json<Event>, ApiError> {
    let event = state
        .metrics
        .upsert(&metric_id, spec)
        .await
        .map_err(|e| api_error("upsert metric", e))?;

    Ok(Json(event))
}
