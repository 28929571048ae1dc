//! Health check endpoint
//!
//! Uptime, progress counters and the most recent cycle failure.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status ("ok", or "degraded" once a cycle has failed)
    pub status: String,
    /// Module name ("geoharvest-ingest")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    pub steps_completed: u64,
    pub photos_accepted: u64,
    pub features_saved: u64,
    /// Last error message if any (for diagnostics)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let last_error = state.last_error.read().await.clone();
    let counters = &state.counters;

    Json(HealthResponse {
        status: if last_error.is_some() { "degraded" } else { "ok" }.to_string(),
        module: "geoharvest-ingest".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        steps_completed: counters.steps_completed.load(Ordering::Relaxed),
        photos_accepted: counters.photos_accepted.load(Ordering::Relaxed),
        features_saved: counters.features_saved.load(Ordering::Relaxed),
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
