//! geoharvest-ingest library interface
//!
//! Crawls geo-tagged photos region by region and enriches them with
//! terrain, road proximity and validity features. The binary wires these
//! pieces to real services; tests drive them with in-memory fakes.

pub mod api;
pub mod clients;
pub mod db;
pub mod error;
pub mod services;
pub mod utils;

pub use crate::error::{IngestError, IngestResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Progress counters reported by `/health`
#[derive(Debug, Default)]
pub struct Counters {
    pub steps_completed: AtomicU64,
    /// Newly inserted photos (replays are not counted)
    pub photos_accepted: AtomicU64,
    pub features_saved: AtomicU64,
}

/// Application state shared by the scheduler and HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last cycle failure for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
    pub counters: Arc<Counters>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
            counters: Arc::new(Counters::default()),
        }
    }

    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .with_state(state)
}
