//! Query handlers served under `/{app.name}`
//!
//! Record lists render as JSON or as an HTML table (`?format=html`); the
//! default comes from `query.default_format`. Lagger endpoints take the
//! threshold in seconds as `?time=` and fall back to
//! `query.lagger_threshold_seconds`.

use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::{html, AppState};
use crate::config::OutputFormat;
use crate::error::AppError;
use crate::query;
use crate::record::RequestRecord;

/// Query parameters shared by the record endpoints
#[derive(Debug, Default, Deserialize)]
pub struct RecordParams {
    pub format: Option<OutputFormat>,
    /// Lagger threshold in seconds
    #[serde(alias = "threshold")]
    pub time: Option<f64>,
}

impl RecordParams {
    fn format(&self, state: &AppState) -> OutputFormat {
        self.format.unwrap_or(state.config.query.default_format)
    }

    fn threshold(&self, state: &AppState) -> Result<f64, AppError> {
        let threshold = self.time.unwrap_or(state.config.query.lagger_threshold_seconds);
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(AppError::BadRequest(format!(
                "time must be a non-negative number of seconds, got {}",
                threshold
            )));
        }
        Ok(threshold)
    }
}

fn render(records: &[&RequestRecord], format: OutputFormat) -> Response {
    match format {
        OutputFormat::Json => Json(records).into_response(),
        OutputFormat::Html => Html(html::records_table(records)).into_response(),
    }
}

/// GET /{name}/ - every record in memory, oldest first
pub async fn get_all(State(state): State<AppState>, Query(params): Query<RecordParams>) -> Response {
    let snapshot = state.store.snapshot();
    render(&query::all(&snapshot), params.format(&state))
}

/// GET /{name}/errors - requests that returned a 5xx
pub async fn get_errors(
    State(state): State<AppState>,
    Query(params): Query<RecordParams>,
) -> Response {
    let snapshot = state.store.snapshot();
    render(&query::errors(&snapshot), params.format(&state))
}

/// GET /{name}/laggers?time=30 - requests that took at least `time` seconds
pub async fn get_laggers(
    State(state): State<AppState>,
    Query(params): Query<RecordParams>,
) -> Result<Response, AppError> {
    let threshold = params.threshold(&state)?;
    let snapshot = state.store.snapshot();
    Ok(render(&query::laggers(&snapshot, threshold), params.format(&state)))
}

/// GET /{name}/services - services with at least one request in memory
pub async fn get_services(State(state): State<AppState>) -> Response {
    let snapshot = state.store.snapshot();
    Json(query::services(&snapshot)).into_response()
}

/// GET /{name}/services/:service
pub async fn get_service(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(params): Query<RecordParams>,
) -> Result<Response, AppError> {
    let snapshot = state.store.snapshot();
    let records =
        query::for_service(&snapshot, &service).ok_or(AppError::ServiceNotFound(service))?;
    Ok(render(&records, params.format(&state)))
}

/// GET /{name}/services/:service/errors
pub async fn get_service_errors(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(params): Query<RecordParams>,
) -> Result<Response, AppError> {
    let snapshot = state.store.snapshot();
    let records =
        query::service_errors(&snapshot, &service).ok_or(AppError::ServiceNotFound(service))?;
    Ok(render(&records, params.format(&state)))
}

/// GET /{name}/services/:service/laggers?time=30
pub async fn get_service_laggers(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(params): Query<RecordParams>,
) -> Result<Response, AppError> {
    let threshold = params.threshold(&state)?;
    let snapshot = state.store.snapshot();
    let records = query::service_laggers(&snapshot, &service, threshold)
        .ok_or(AppError::ServiceNotFound(service))?;
    Ok(render(&records, params.format(&state)))
}

/// GET /{name}/status - per-service error rollup, as pushed to the status sink
pub async fn get_status(State(state): State<AppState>) -> Response {
    let snapshot = state.store.snapshot();
    Json(query::status_summary(&snapshot)).into_response()
}

/// GET /{name}/store - store occupancy
pub async fn get_store(State(state): State<AppState>) -> Response {
    Json(json!({
        "len": state.store.len(),
        "capacity": state.store.capacity(),
    }))
    .into_response()
}
