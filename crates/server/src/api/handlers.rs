use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use billwire_core::{controller::RunPhase, pool::PoolStatus, ProgressSnapshot, SanitizedConfig};

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub phase: RunPhase,
    pub config_hash: String,
    pub started_at: DateTime<Utc>,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        phase: state.snapshot().await.phase,
        config_hash: state.config_hash().to_string(),
        started_at: state.started_at(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// Latest controller snapshot.
pub async fn get_progress(State(state): State<Arc<AppState>>) -> Json<ProgressSnapshot> {
    Json(state.snapshot().await)
}

pub async fn list_pools(State(state): State<Arc<AppState>>) -> Json<Vec<PoolStatus>> {
    Json(state.pool_statuses())
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state).await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
