//! Monthly hourly ridership from the Seoul open-data API (`CardSubwayTime`)
//!
//! Each API row holds one station and month, with `HR_{h}_GET_ON_NOPE` and
//! `HR_{h}_GET_OFF_NOPE` totals for service hours 4 through 3 the next
//! morning. Rows become [`WideRow`]s carrying the CSV export's bucket labels,
//! so both history sources go through `history::aggregate`.

use crate::retry::RetryPolicy;
use chrono::{Datelike, Days, Months, NaiveDate};
use reqwest::StatusCode;
use seathunter_common::history::{parse_count, Direction, WideRow};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const SEOUL_OPENAPI_BASE_URL: &str = "http://openapi.seoul.go.kr:8088";

const SERVICE_NAME: &str = "CardSubwayTime";

/// Largest page the open-data API serves
pub const MAX_PAGE_SIZE: u32 = 1000;

const CODE_OK: &str = "INFO-000";
const CODE_NO_DATA: &str = "INFO-200";

/// Service hours in the order the API lists them
const SERVICE_HOURS: [u8; 24] = [
    4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 0, 1, 2, 3,
];

#[derive(Debug, Error)]
pub enum HistoryApiError {
    #[error("History API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("History API returned {code}: {message}")]
    Api { code: String, message: String },

    #[error("History API still throttling after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Malformed history response: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default, rename = "CardSubwayTime")]
    service: Option<ServiceBody>,
    #[serde(default, rename = "RESULT")]
    result: Option<ResultStatus>,
}

#[derive(Debug, Deserialize)]
struct ServiceBody {
    #[serde(default)]
    list_total_count: u32,
    #[serde(default, rename = "RESULT")]
    result: Option<ResultStatus>,
    #[serde(default)]
    row: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct ResultStatus {
    #[serde(rename = "CODE")]
    code: String,
    #[serde(default, rename = "MESSAGE")]
    message: String,
}

/// One station-month of ridership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRow {
    /// `YYYYMM`
    pub month: String,
    pub line: String,
    pub station_name: String,
    /// Raw count per (service hour, direction)
    pub cells: BTreeMap<(u8, Direction), String>,
}

/// One page of results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardPage {
    pub total_count: u32,
    pub rows: Vec<CardRow>,
}

fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Count text for a cell; integral floats ("1234.0") lose the fraction
fn count_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(match (n.as_u64(), n.as_f64()) {
            (Some(count), _) => count.to_string(),
            (None, Some(f)) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
                format!("{:.0}", f)
            }
            _ => n.to_string(),
        }),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// `HR_8_GET_OFF_NOPE` → (8, Alighting)
fn cell_key(field: &str) -> Option<(u8, Direction)> {
    let rest = field.strip_prefix("HR_")?;
    let (hour, direction) = rest.split_once('_')?;
    let direction = match direction {
        "GET_ON_NOPE" => Direction::Boarding,
        "GET_OFF_NOPE" => Direction::Alighting,
        _ => return None,
    };
    let hour = hour.parse::<u8>().ok().filter(|h| *h < 24)?;
    Some((hour, direction))
}

fn card_row(raw: &Map<String, Value>) -> Option<CardRow> {
    let station_name = text_of(raw.get("STTN")).filter(|s| !s.is_empty())?;
    let cells = raw
        .iter()
        .filter_map(|(field, value)| Some((cell_key(field)?, count_text(value)?)))
        .collect();
    Some(CardRow {
        month: text_of(raw.get("USE_MM")).unwrap_or_default(),
        line: text_of(raw.get("SBWY_ROUT_LN_NM")).unwrap_or_default(),
        station_name,
        cells,
    })
}

/// Parse one response body
///
/// "No data" (a month not yet published) is an empty page; any other
/// non-success code is an error. Rows without a station name are skipped.
pub fn parse_card_page(body: &str) -> Result<CardPage, HistoryApiError> {
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| HistoryApiError::Malformed(e.to_string()))?;

    let status = envelope
        .service
        .as_ref()
        .and_then(|s| s.result.as_ref())
        .or(envelope.result.as_ref());
    match status {
        Some(status) if status.code == CODE_NO_DATA => return Ok(CardPage::default()),
        Some(status) if status.code != CODE_OK => {
            return Err(HistoryApiError::Api {
                code: status.code.clone(),
                message: status.message.clone(),
            })
        }
        _ => {}
    }

    let service = envelope
        .service
        .ok_or_else(|| HistoryApiError::Malformed(format!("missing {} section", SERVICE_NAME)))?;

    let mut rows = Vec::with_capacity(service.row.len());
    for raw in &service.row {
        match card_row(raw) {
            Some(row) => rows.push(row),
            None => warn!("Skipping ridership row without a station name"),
        }
    }
    Ok(CardPage {
        total_count: service.list_total_count,
        rows,
    })
}

/// Bucket label matching the CSV export for a service hour
///
/// Hours 4-5 fall in "06시 이전" and hours 0-3 in "24시 이후".
pub fn bucket_label(hour: u8) -> String {
    match hour {
        4 | 5 => "06시 이전".to_string(),
        0..=3 => "24시 이후".to_string(),
        _ => format!("{:02}시-{:02}시", hour, hour + 1),
    }
}

/// Sum of the raw counts sharing one bucket
///
/// The first unparseable raw value is passed through so that aggregation
/// reports it; a sum past u64 stays unparseable as well.
fn merge_counts(raws: &[&str]) -> String {
    let mut total: u128 = 0;
    for raw in raws {
        match parse_count(raw) {
            Ok(count) => total += u128::from(count),
            Err(_) => return raw.to_string(),
        }
    }
    total.to_string()
}

impl CardRow {
    /// Boarding and alighting rows in export bucket order
    pub fn to_wide_rows(&self) -> Vec<WideRow> {
        [Direction::Boarding, Direction::Alighting]
            .into_iter()
            .map(|direction| {
                let mut grouped: Vec<(String, Vec<&str>)> = Vec::new();
                for hour in SERVICE_HOURS {
                    let Some(raw) = self.cells.get(&(hour, direction)) else {
                        continue;
                    };
                    let label = bucket_label(hour);
                    if let Some((last, raws)) = grouped.last_mut() {
                        if *last == label {
                            raws.push(raw.as_str());
                            continue;
                        }
                    }
                    grouped.push((label, vec![raw.as_str()]));
                }
                WideRow {
                    station_name: self.station_name.clone(),
                    direction,
                    buckets: grouped
                        .into_iter()
                        .map(|(label, raws)| (label, merge_counts(&raws)))
                        .collect(),
                }
            })
            .filter(|row| !row.buckets.is_empty())
            .collect()
    }
}

/// The `count` whole months before `today`'s month, oldest first
pub fn history_months(today: NaiveDate, count: u32) -> Vec<String> {
    let Some(first_of_month) = today.checked_sub_days(Days::new(u64::from(today.day0()))) else {
        return Vec::new();
    };
    (1..=count)
        .rev()
        .filter_map(|back| first_of_month.checked_sub_months(Months::new(back)))
        .map(|month| month.format("%Y%m").to_string())
        .collect()
}

/// Outcome of a multi-month fetch
#[derive(Debug, Clone, Default)]
pub struct HistoryFetch {
    pub rows: Vec<CardRow>,
    pub months_fetched: Vec<String>,
    pub months_failed: Vec<String>,
}

impl HistoryFetch {
    pub fn wide_rows(&self) -> Vec<WideRow> {
        self.rows.iter().flat_map(CardRow::to_wide_rows).collect()
    }
}

pub struct CardHistoryClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
    /// Lines kept; empty keeps every line
    lines: Vec<String>,
    /// Wait between months
    pause: Duration,
}

impl CardHistoryClient {
    pub fn new(api_key: impl Into<String>, retry: RetryPolicy) -> Result<Self, HistoryApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: SEOUL_OPENAPI_BASE_URL.to_string(),
            client,
            retry,
            lines: Vec::new(),
            pause: Duration::from_millis(500),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_lines(mut self, lines: Vec<String>) -> Self {
        self.lines = lines;
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// `/{key}/json/CardSubwayTime/{start}/{end}/{YYYYMM}`
    pub fn page_url(&self, month: &str, start: u32, end: u32) -> String {
        format!(
            "{}/{}/json/{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_key,
            SERVICE_NAME,
            start,
            end,
            month
        )
    }

    fn wants_line(&self, line: &str) -> bool {
        self.lines.is_empty() || self.lines.iter().any(|l| l == line)
    }

    async fn get_body(&self, url: &str) -> Result<String, HistoryApiError> {
        let mut attempt = 0u32;
        loop {
            let response = self.client.get(url).send().await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                attempt += 1;
                match self.retry.delay_for(attempt) {
                    Some(delay) => {
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "History API throttled, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    None => return Err(HistoryApiError::RateLimited { attempts: attempt }),
                }
            }

            return Ok(response.error_for_status()?.text().await?);
        }
    }

    /// Every row for one month, page by page, restricted to the configured lines
    pub async fn fetch_month(&self, month: &str) -> Result<Vec<CardRow>, HistoryApiError> {
        let mut rows = Vec::new();
        let mut start = 1u32;
        loop {
            let end = start + MAX_PAGE_SIZE - 1;
            let body = self.get_body(&self.page_url(month, start, end)).await?;
            let page = parse_card_page(&body)?;
            let fetched = page.rows.len();
            rows.extend(page.rows.into_iter().filter(|row| self.wants_line(&row.line)));
            debug!(month, start, end, fetched, total = page.total_count, "Fetched ridership page");

            if fetched == 0 || end >= page.total_count {
                break;
            }
            start = end + 1;
        }
        Ok(rows)
    }

    /// Fetch each month in turn; a failing month is logged and skipped
    pub async fn fetch_months(&self, months: &[String]) -> HistoryFetch {
        let mut fetch = HistoryFetch::default();
        for (i, month) in months.iter().enumerate() {
            if i > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            match self.fetch_month(month).await {
                Ok(rows) if rows.is_empty() => {
                    info!(month = %month, "No ridership published");
                    fetch.months_fetched.push(month.clone());
                }
                Ok(rows) => {
                    info!(month = %month, stations = rows.len(), "Fetched ridership");
                    fetch.rows.extend(rows);
                    fetch.months_fetched.push(month.clone());
                }
                Err(e) => {
                    warn!(month = %month, "Ridership fetch failed: {}", e);
                    fetch.months_failed.push(month.clone());
                }
            }
        }
        fetch
    }
}
