//! File-level checks for the ETL building blocks

use seathunter_common::db;
use seathunter_common::history::aggregate;
use seathunter_common::realtime::{load_snapshot_dir, write_snapshot, ArrivalSnapshot};
use seathunter_common::{reconcile, Error, RiskLevel};
use seathunter_etl::read_wide_csv;
use seathunter_etl::seoul_api::parse_arrival_response;

const EXPORT: &str = "연번,날짜,호선,역번호,역명,구분,06시 이전,08시-09시,09시-10시\n\
    1,2024-02,2호선,222,강남,하차,100,\"3,400\",2100\n\
    2,2024-03,2호선,222,강남,하차,120,\"3,600\",2300\n\
    3,2024-03,1호선,150,서울역,하차,90,\"6,000\",3000\n\
    4,2024-03,1호선,150,서울역,승차,400,\"1,500\",900\n";

#[tokio::test]
async fn test_csv_file_into_store() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("hourly.csv");
    std::fs::write(&csv_path, EXPORT).unwrap();

    let rows = read_wide_csv(&csv_path).unwrap();
    assert_eq!(rows.len(), 4);

    let aggregation = aggregate(&rows).unwrap();
    assert!(aggregation.dropped.is_empty());

    let pool = db::init_database(&dir.path().join("seathunter.db")).await.unwrap();
    db::replace_aggregates(&pool, &aggregation.aggregates).await.unwrap();

    assert_eq!(db::alighting_volume(&pool, "강남역", 8).await.unwrap(), Some(3500));
    assert_eq!(db::alighting_volume(&pool, "서울", 9).await.unwrap(), Some(3000));
    assert_eq!(db::alighting_volume(&pool, "강남", 5).await.unwrap(), Some(110));
}

#[test]
fn test_missing_csv_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        read_wide_csv(&dir.path().join("absent.csv")),
        Err(Error::Io(_))
    ));
}

#[test]
fn test_api_response_to_report() {
    let body = r#"{
        "errorMessage": {"code": "INFO-000", "message": "정상 처리되었습니다."},
        "realtimeArrivalList": [
            {"statnNm": "서울역", "trainLineNm": "청량리행", "arvlMsg2": "전역 도착", "barvlDt": "40"},
            {"statnNm": "강남", "trainLineNm": "성수행", "arvlMsg2": "3분 후", "barvlDt": "180"}
        ]
    }"#;
    let arrivals = parse_arrival_response(body).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let at = chrono::NaiveDate::from_ymd_opt(2024, 3, 4)
        .unwrap()
        .and_hms_opt(8, 5, 0)
        .unwrap();
    write_snapshot(dir.path(), &ArrivalSnapshot::new(at, arrivals), at).unwrap();

    let rows = read_wide_csv_from_str(EXPORT);
    let historical = aggregate(&rows).unwrap().aggregates;
    let batch = load_snapshot_dir(dir.path()).unwrap();
    let report = reconcile(&historical, &batch.observations);

    assert_eq!(report.len(), 2);
    assert_eq!(report[0].station_name, "서울");
    assert_eq!(report[0].expected_alighting_count, 6000);
    assert_eq!(report[0].risk_level, RiskLevel::HighRisk);
    assert_eq!(report[1].station_name, "강남");
    assert_eq!(report[1].risk_level, RiskLevel::Normal);
}

fn read_wide_csv_from_str(content: &str) -> Vec<seathunter_common::history::WideRow> {
    seathunter_etl::read_wide_rows(content.as_bytes()).unwrap()
}
