//! seathunter-api library - read-only presentation API
//!
//! Serves station recommendations and the real-time congestion report over
//! HTTP for the dashboard.

use axum::Router;
use seathunter_common::ScoringEngine;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;

pub mod api;
pub mod error;

pub use error::{ApiError, ApiResult};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub engine: Arc<ScoringEngine>,
    /// Folder holding arrival snapshot files
    pub snapshot_dir: PathBuf,
    /// Hour whose alighting average is used as off-board volume
    pub reference_hour: u8,
}

impl AppState {
    pub fn new(db: SqlitePool, snapshot_dir: PathBuf, reference_hour: u8) -> Self {
        Self {
            db,
            engine: Arc::new(ScoringEngine::default()),
            snapshot_dir,
            reference_hour,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::station_routes())
        .merge(api::congestion_routes())
        .with_state(state)
}
