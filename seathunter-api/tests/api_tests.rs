//! Integration tests for seathunter-api endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::NaiveDate;
use seathunter_api::{build_router, AppState};
use seathunter_common::db;
use seathunter_common::realtime::{write_snapshot, ArrivalRecord, ArrivalSnapshot};
use seathunter_common::{Direction, Feature, HistoricalAggregate, StationProfile, TargetCode};
use serde_json::Value;
use std::collections::BTreeSet;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

/// Test helper: scratch database seeded with two profiled stations
async fn setup_app() -> (TempDir, axum::Router) {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::init_database(&dir.path().join("seathunter.db")).await.unwrap();

    db::replace_profiles(
        &pool,
        &[
            StationProfile::new(
                "서울역",
                BTreeSet::from([Feature::Terminal, Feature::TransferHub]),
                BTreeSet::from([TargetCode::Traveler, TargetCode::Transfer]),
            ),
            StationProfile::new(
                "홍대입구",
                BTreeSet::from([Feature::University, Feature::NightlifeHub]),
                BTreeSet::from([TargetCode::UnivStudent, TargetCode::Hotplace]),
            ),
            StationProfile::general("도봉산"),
        ],
    )
    .await
    .unwrap();

    db::replace_aggregates(
        &pool,
        &[
            HistoricalAggregate {
                station_name: "서울역".to_string(),
                hour: 8,
                direction: Direction::Alighting,
                average_count: 6000,
            },
            HistoricalAggregate {
                station_name: "홍대입구".to_string(),
                hour: 8,
                direction: Direction::Alighting,
                average_count: 1200,
            },
            HistoricalAggregate {
                station_name: "홍대입구".to_string(),
                hour: 22,
                direction: Direction::Alighting,
                average_count: 4200,
            },
        ],
    )
    .await
    .unwrap();

    let state = AppState::new(pool, dir.path().join("raw"), 8);
    (dir, build_router(state))
}

fn test_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, app) = setup_app().await;
    let response = app.oneshot(test_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "seathunter-api");
    assert!(body["version"].is_string());
}

// =============================================================================
// Stations
// =============================================================================

#[tokio::test]
async fn test_station_list_is_sorted() {
    let (_dir, app) = setup_app().await;
    let response = app.oneshot(test_request("/api/stations")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["count"], 3);
    assert_eq!(body["stations"][0], "도봉산");
    assert_eq!(body["stations"][1], "서울역");
    assert_eq!(body["stations"][2], "홍대입구");
}

#[tokio::test]
async fn test_recommendation_uses_reference_hour() {
    let (_dir, app) = setup_app().await;
    let uri = "/api/stations/%EC%84%9C%EC%9A%B8/recommendation"; // 서울
    let response = app.oneshot(test_request(uri)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["station_name"], "서울역");
    assert_eq!(body["off_board_volume"], 6000);
    assert_eq!(body["best_car"], 4);
    assert_eq!(body["score"], 85);
    assert_eq!(body["per_car_scores"]["1"], 65);
    assert_eq!(body["rationale"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_recommendation_hour_override() {
    let (_dir, app) = setup_app().await;
    let uri = "/api/stations/%ED%99%8D%EB%8C%80%EC%9E%85%EA%B5%AC/recommendation?hour=22";
    let response = app.oneshot(test_request(uri)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["off_board_volume"], 4200);
    // Hotplace (5, 6) and UnivStudent (3, 5, 8) overlap on car 5
    assert_eq!(body["best_car"], 5);
    assert_eq!(body["score"], 100);
}

#[tokio::test]
async fn test_recommendation_without_history_has_zero_volume() {
    let (_dir, app) = setup_app().await;
    let uri = "/api/stations/%EB%8F%84%EB%B4%89%EC%82%B0/recommendation";
    let response = app.oneshot(test_request(uri)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["off_board_volume"], 0);
    assert_eq!(body["best_car"], 1);
    assert_eq!(body["score"], 50);
    assert!(body["rationale"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_station_is_404() {
    let (_dir, app) = setup_app().await;
    let uri = "/api/stations/%EB%B6%80%EC%82%B0/recommendation"; // 부산
    let response = app.oneshot(test_request(uri)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_out_of_range_hour_is_400() {
    let (_dir, app) = setup_app().await;
    let uri = "/api/stations/%EB%8F%84%EB%B4%89%EC%82%B0/recommendation?hour=30";
    let response = app.oneshot(test_request(uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Congestion
// =============================================================================

#[tokio::test]
async fn test_congestion_without_snapshots_is_empty() {
    let (_dir, app) = setup_app().await;
    let response = app.oneshot(test_request("/api/congestion")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["total"], 0);
    assert!(body["rows"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_congestion_report_from_snapshot() {
    let (dir, app) = setup_app().await;
    let at = NaiveDate::from_ymd_opt(2024, 3, 4)
        .unwrap()
        .and_hms_opt(8, 20, 0)
        .unwrap();
    let arrival = |station: &str, secs: u32| ArrivalRecord {
        station_name: station.to_string(),
        train_line: "성수행".to_string(),
        arrival_message: "전역 도착".to_string(),
        arrival_time_sec: Some(secs),
    };
    write_snapshot(
        &dir.path().join("raw"),
        &ArrivalSnapshot::new(
            at,
            vec![arrival("잠실", 10), arrival("홍대입구", 30), arrival("서울", 45)],
        ),
        at,
    )
    .unwrap();

    let response = app
        .oneshot(test_request("/api/congestion?limit=2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["snapshot_files"], 1);
    let rows = body["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["station_name"], "서울");
    assert_eq!(rows[0]["expected_alighting_count"], 6000);
    assert_eq!(rows[0]["risk_level"], "high_risk");
    assert_eq!(rows[1]["station_name"], "홍대입구");
    assert_eq!(rows[1]["risk_level"], "normal");
}

#[tokio::test]
async fn test_congestion_zero_limit_is_400() {
    let (_dir, app) = setup_app().await;
    let response = app
        .oneshot(test_request("/api/congestion?limit=0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
