//! Seoul open-data real-time arrival API (`realtimeStationArrival`)

use seathunter_common::realtime::ArrivalRecord;
use seathunter_common::station;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const SEOUL_REALTIME_BASE_URL: &str = "http://swopenAPI.seoul.go.kr/api/subway";

/// Status code for a successful call
const CODE_OK: &str = "INFO-000";
/// Status code for "no data for this station right now"
const CODE_NO_DATA: &str = "INFO-200";

#[derive(Debug, Error)]
pub enum ArrivalApiError {
    #[error("Arrival API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Arrival API returned {code}: {message}")]
    Api { code: String, message: String },

    #[error("Malformed arrival response: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArrivalResponse {
    #[serde(default)]
    error_message: Option<ApiStatus>,
    /// Failures are reported at the top level instead of under `errorMessage`
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    realtime_arrival_list: Option<Vec<RawArrival>>,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawArrival {
    #[serde(default, rename = "statnNm")]
    statn_nm: String,
    #[serde(default, rename = "trainLineNm")]
    train_line_nm: String,
    #[serde(default, rename = "arvlMsg2")]
    arvl_msg2: String,
    #[serde(default, rename = "barvlDt")]
    barvl_dt: Option<serde_json::Value>,
}

fn seconds_from(value: Option<&serde_json::Value>) -> Option<u32> {
    match value? {
        serde_json::Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        serde_json::Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

/// Arrival records from a response body
///
/// "No data" is an empty list; any other non-success code is an error.
/// Station names are returned without the trailing "역".
pub fn parse_arrival_response(body: &str) -> Result<Vec<ArrivalRecord>, ArrivalApiError> {
    let response: ArrivalResponse =
        serde_json::from_str(body).map_err(|e| ArrivalApiError::Malformed(e.to_string()))?;

    let (code, message) = match response.error_message {
        Some(status) => (status.code, status.message),
        None => (response.code, response.message),
    };
    match code.as_deref() {
        Some(CODE_NO_DATA) => return Ok(Vec::new()),
        Some(CODE_OK) | None => {}
        Some(other) => {
            return Err(ArrivalApiError::Api {
                code: other.to_string(),
                message: message.unwrap_or_default(),
            })
        }
    }

    Ok(response
        .realtime_arrival_list
        .unwrap_or_default()
        .into_iter()
        .map(|raw| ArrivalRecord {
            station_name: station::join_key(&raw.statn_nm),
            train_line: raw.train_line_nm,
            arrival_message: raw.arvl_msg2,
            arrival_time_sec: seconds_from(raw.barvl_dt.as_ref()),
        })
        .collect())
}

pub struct SeoulArrivalClient {
    api_key: String,
    base_url: String,
    max_arrivals: u32,
    client: reqwest::Client,
}

impl SeoulArrivalClient {
    pub fn new(api_key: impl Into<String>, max_arrivals: u32) -> Result<Self, ArrivalApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: SEOUL_REALTIME_BASE_URL.to_string(),
            max_arrivals: max_arrivals.max(1),
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Request URL for one station; the "역" suffix is dropped
    pub fn arrival_url(&self, station_name: &str) -> String {
        format!(
            "{}/{}/json/realtimeStationArrival/0/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_key,
            self.max_arrivals,
            station::join_key(station_name)
        )
    }

    pub async fn fetch_arrivals(&self, station_name: &str) -> Result<Vec<ArrivalRecord>, ArrivalApiError> {
        let response = self
            .client
            .get(self.arrival_url(station_name))
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        let arrivals = parse_arrival_response(&body)?;
        debug!(station = station_name, arrivals = arrivals.len(), "Fetched arrivals");
        Ok(arrivals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OK_BODY: &str = r#"{
        "errorMessage": {"status": 200, "code": "INFO-000", "message": "정상 처리되었습니다.", "total": 2},
        "realtimeArrivalList": [
            {"statnNm": "서울역", "trainLineNm": "청량리행 - 시청방면", "arvlMsg2": "전역 도착", "barvlDt": "45"},
            {"statnNm": "서울", "trainLineNm": "인천행 - 남영방면", "arvlMsg2": "3분 후", "barvlDt": 180}
        ]
    }"#;

    #[test]
    fn test_parse_success() {
        let arrivals = parse_arrival_response(OK_BODY).unwrap();
        assert_eq!(arrivals.len(), 2);
        assert_eq!(arrivals[0].station_name, "서울");
        assert_eq!(arrivals[0].train_line, "청량리행 - 시청방면");
        assert_eq!(arrivals[0].arrival_message, "전역 도착");
        assert_eq!(arrivals[0].arrival_time_sec, Some(45));
        assert_eq!(arrivals[1].station_name, "서울");
        assert_eq!(arrivals[1].arrival_time_sec, Some(180));
    }

    #[test]
    fn test_no_data_is_empty() {
        let body = r#"{"status": 500, "code": "INFO-200", "message": "해당하는 데이터가 없습니다.", "total": 0}"#;
        assert!(parse_arrival_response(body).unwrap().is_empty());
    }

    #[test]
    fn test_api_error_code() {
        let body = r#"{"errorMessage": {"code": "ERROR-337", "message": "일일 호출 한도 초과"}}"#;
        match parse_arrival_response(body) {
            Err(ArrivalApiError::Api { code, message }) => {
                assert_eq!(code, "ERROR-337");
                assert_eq!(message, "일일 호출 한도 초과");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_seconds() {
        let body = r#"{"realtimeArrivalList": [{"statnNm": "강남", "barvlDt": "-"}, {"statnNm": "강남"}]}"#;
        let arrivals = parse_arrival_response(body).unwrap();
        assert!(arrivals.iter().all(|a| a.arrival_time_sec.is_none()));
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            parse_arrival_response("not json"),
            Err(ArrivalApiError::Malformed(_))
        ));
    }

    #[test]
    fn test_arrival_url_strips_suffix() {
        let client = SeoulArrivalClient::new("KEY", 10)
            .unwrap()
            .with_base_url("http://localhost:9/api/subway/");
        assert_eq!(
            client.arrival_url("서울역"),
            "http://localhost:9/api/subway/KEY/json/realtimeStationArrival/0/10/서울"
        );
        assert_eq!(
            client.arrival_url("역삼"),
            "http://localhost:9/api/subway/KEY/json/realtimeStationArrival/0/10/역삼"
        );
    }
}
