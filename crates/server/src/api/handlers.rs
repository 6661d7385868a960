use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use carbone_core::{MetricsSnapshot, PrecacheStatus, SanitizedConfig};
use serde::Serialize;
use std::sync::Arc;

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    pub status: String,
    pub metrics: MetricsSnapshot,
    pub uptime_secs: u64,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precache: Option<PrecacheStatus>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// Per-stage timings and counters as JSON.
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsResponse> {
    let engine = state.engine();
    Json(MetricsResponse {
        status: "healthy".to_string(),
        metrics: engine.metrics_snapshot(),
        uptime_secs: state.uptime_secs(),
        started_at: state.started_at().to_rfc3339(),
        precache: engine.precache_status(),
    })
}

/// Prometheus text exposition.
pub async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state).await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
