//! Station listing and car recommendation endpoints

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use seathunter_common::{db, Recommendation};
use tracing::debug;

use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct StationListResponse {
    pub count: usize,
    pub stations: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationParams {
    /// Overrides the configured reference hour
    pub hour: Option<u8>,
}

/// GET /api/stations
///
/// Profiled station names in sorted order.
pub async fn list_stations(State(state): State<AppState>) -> ApiResult<Json<StationListResponse>> {
    let stations: Vec<String> = db::load_profiles(&state.db)
        .await?
        .into_iter()
        .map(|p| p.station_name)
        .collect();

    Ok(Json(StationListResponse {
        count: stations.len(),
        stations,
    }))
}

/// GET /api/stations/:name/recommendation
///
/// Off-board volume is the alighting average at the reference hour, 0 when
/// the station has no historical record for it.
pub async fn get_recommendation(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<RecommendationParams>,
) -> ApiResult<Json<Recommendation>> {
    let hour = params.hour.unwrap_or(state.reference_hour);
    if hour > 24 {
        return Err(ApiError::BadRequest(format!("hour must be 0-24, got {}", hour)));
    }

    let profile = db::find_profile(&state.db, &name).await?;
    let volume = db::alighting_volume(&state.db, &profile.station_name, hour)
        .await?
        .unwrap_or(0);
    debug!(station = %profile.station_name, hour, volume, "Scoring station");

    Ok(Json(state.engine.score(&profile, volume)))
}

pub fn station_routes() -> Router<AppState> {
    Router::new()
        .route("/api/stations", get(list_stations))
        .route("/api/stations/:name/recommendation", get(get_recommendation))
}
