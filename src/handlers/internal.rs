use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;

use super::AppState;

/// Application metadata served at the root path
#[derive(Debug, Serialize)]
pub struct Metadata {
    pub name: String,
    pub version: &'static str,
    pub description: &'static str,
    pub repository_url: &'static str,
}

/// Handle / endpoint
pub async fn get_index(State(state): State<AppState>) -> Json<Metadata> {
    Json(Metadata {
        name: state.config.app.name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        description: env!("CARGO_PKG_DESCRIPTION"),
        repository_url: env!("CARGO_PKG_REPOSITORY"),
    })
}

/// Handle /health endpoint
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Handle /metrics endpoint
pub async fn metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    let metrics = handle.render();
    (StatusCode::OK, metrics)
}
