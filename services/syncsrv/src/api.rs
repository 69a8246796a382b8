//! Admin HTTP API
//!
//! Read access to the shared state plus a manual job trigger.

use crate::app_state::AppState;
use crate::jobs::{JobKind, SyncReport};
use crate::state::{JobStatus, PortalMetricsSnapshot};
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use errors::PortalResult;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub database: &'static str,
}

pub fn create_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(prometheus_metrics))
        .route("/api/lorawan/gateways", get(list_gateways))
        .route("/api/metrics/portal", get(portal_metrics))
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/{name}", get(get_job))
        .route("/api/jobs/{name}/run", post(run_job_now))
        .layer(axum::middleware::from_fn(common::logging::http_request_logger))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database_ok = state.sqlite_client.ping().await.is_ok();
    Json(HealthResponse {
        status: if database_ok { "healthy" } else { "degraded" },
        service: state.config.service.name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        database: if database_ok { "ok" } else { "unavailable" },
    })
}

async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> PortalResult<impl IntoResponse> {
    let body = state.context().gauges.encode()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

async fn list_gateways(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.context().gateway_ids.snapshot().as_ref().clone())
}

async fn portal_metrics(State(state): State<Arc<AppState>>) -> Json<PortalMetricsSnapshot> {
    Json(state.context().metrics.snapshot())
}

async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobStatus>> {
    Json(state.board().all())
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> PortalResult<Json<JobStatus>> {
    let kind = JobKind::from_str(&name)?;
    state
        .board()
        .status(kind)
        .map(Json)
        .ok_or_else(|| errors::PortalError::not_found(format!("job {}", name)))
}

/// Runs the job and answers with its report; 409 while a run is in progress
async fn run_job_now(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> PortalResult<Json<SyncReport>> {
    let kind = JobKind::from_str(&name)?;
    let report = state.runner.execute(kind).await?;
    Ok(Json(report))
}
