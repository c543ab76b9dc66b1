//! Real-time congestion report endpoint

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use seathunter_common::realtime::{load_snapshot_dir, SnapshotBatch};
use seathunter_common::{db, reconcile, CongestionReportRow};
use tracing::info;

use crate::{ApiError, ApiResult, AppState};

const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct CongestionParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CongestionResponse {
    /// Rows before the limit was applied
    pub total: usize,
    pub snapshot_files: usize,
    pub rows: Vec<CongestionReportRow>,
}

/// GET /api/congestion?limit=N
///
/// A missing snapshot folder yields an empty report.
pub async fn get_congestion(
    State(state): State<AppState>,
    Query(params): Query<CongestionParams>,
) -> ApiResult<Json<CongestionResponse>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 {
        return Err(ApiError::BadRequest("limit must be positive".to_string()));
    }

    let historical = db::load_aggregates(&state.db).await?;

    let dir = state.snapshot_dir.clone();
    let batch = tokio::task::spawn_blocking(move || {
        if dir.is_dir() {
            load_snapshot_dir(&dir)
        } else {
            Ok(SnapshotBatch::default())
        }
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Snapshot loading failed: {}", e)))??;

    let mut rows = reconcile(&historical, &batch.observations);
    let total = rows.len();
    rows.truncate(limit);
    info!(total, shown = rows.len(), "Served congestion report");

    Ok(Json(CongestionResponse {
        total,
        snapshot_files: batch.files_read,
        rows,
    }))
}

pub fn congestion_routes() -> Router<AppState> {
    Router::new().route("/api/congestion", get(get_congestion))
}
