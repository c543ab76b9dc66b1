//! Kakao Local keyword search as a [`PlaceSearch`] backend
//!
//! The classifier is synchronous, so this client uses reqwest's blocking API.
//! Construct and use it off the async runtime (e.g. inside
//! `tokio::task::spawn_blocking`).

use crate::retry::RetryPolicy;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::StatusCode;
use seathunter_common::classifier::{LookupFailure, PlaceQuery, PlaceSearch};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

pub const KAKAO_KEYWORD_URL: &str = "https://dapi.kakao.com/v2/local/search/keyword.json";

/// Kakao's documented per-key ceiling
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 20;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Deserialize)]
struct KeywordResponse {
    #[serde(default)]
    meta: Option<KeywordMeta>,
    #[serde(default)]
    documents: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct KeywordMeta {
    #[serde(default)]
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct KakaoErrorBody {
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Match count from a keyword-search response body
///
/// No documents means no match regardless of `meta`; otherwise the larger of
/// `meta.total_count` and the page size.
pub fn parse_match_count(body: &str) -> Result<u32, LookupFailure> {
    let response: KeywordResponse =
        serde_json::from_str(body).map_err(|e| LookupFailure::Malformed(e.to_string()))?;

    if response.documents.is_empty() {
        return Ok(0);
    }
    let total = response.meta.map(|m| m.total_count).unwrap_or(0);
    let count = total.max(response.documents.len() as u64);
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

/// Query-string parameters for one lookup; an empty category filter is omitted
pub fn request_params(query: &PlaceQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![("query", query.query.clone())];
    if !query.category_filter.is_empty() {
        params.push(("category_group_code", query.category_filter.clone()));
    }
    params.push(("radius", query.radius_m.to_string()));
    params.push(("size", "1".to_string()));
    params
}

fn rejection(status: StatusCode, body: &str) -> LookupFailure {
    let message = serde_json::from_str::<KakaoErrorBody>(body)
        .ok()
        .and_then(|e| match (e.error_type, e.message) {
            (Some(kind), Some(msg)) => Some(format!("{}: {}", kind, msg)),
            (kind, msg) => msg.or(kind),
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
    LookupFailure::Rejected {
        status: status.as_u16(),
        message,
    }
}

pub struct KakaoPlaceSearch {
    api_key: String,
    base_url: String,
    client: reqwest::blocking::Client,
    rate_limiter: DirectLimiter,
    retry: RetryPolicy,
}

impl KakaoPlaceSearch {
    pub fn new(
        api_key: impl Into<String>,
        requests_per_second: u32,
        retry: RetryPolicy,
    ) -> Result<Self, LookupFailure> {
        let per_second = NonZeroU32::new(requests_per_second)
            .or(NonZeroU32::new(DEFAULT_REQUESTS_PER_SECOND))
            .ok_or_else(|| LookupFailure::Transport("Invalid rate limit".to_string()))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LookupFailure::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key: api_key.into(),
            base_url: KAKAO_KEYWORD_URL.to_string(),
            client,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
            retry,
        })
    }

    /// Point at another endpoint (tests, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn send_once(&self, query: &PlaceQuery) -> Result<(StatusCode, String), LookupFailure> {
        futures::executor::block_on(self.rate_limiter.until_ready());

        let response = self
            .client
            .get(&self.base_url)
            .header("Authorization", format!("KakaoAK {}", self.api_key))
            .query(&request_params(query))
            .send()
            .map_err(|e| LookupFailure::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| LookupFailure::Transport(e.to_string()))?;
        Ok((status, body))
    }
}

impl PlaceSearch for KakaoPlaceSearch {
    fn search(&self, query: &PlaceQuery) -> Result<u32, LookupFailure> {
        let mut attempt = 0u32;
        loop {
            let (status, body) = self.send_once(query)?;

            if status == StatusCode::TOO_MANY_REQUESTS {
                attempt += 1;
                match self.retry.delay_for(attempt) {
                    Some(delay) => {
                        warn!(
                            query = %query.query,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Place search throttled, backing off"
                        );
                        std::thread::sleep(delay);
                        continue;
                    }
                    None => return Err(LookupFailure::RateLimited { attempts: attempt }),
                }
            }

            if !status.is_success() {
                return Err(rejection(status, &body));
            }

            let count = parse_match_count(&body)?;
            debug!(query = %query.query, category = %query.category_filter, count, "Place search");
            return Ok(count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_count_from_meta() {
        let body = r#"{"meta":{"total_count":7,"pageable_count":7,"is_end":false},
            "documents":[{"place_name":"서울대학교"}]}"#;
        assert_eq!(parse_match_count(body), Ok(7));
    }

    #[test]
    fn test_no_documents_is_zero() {
        let body = r#"{"meta":{"total_count":3},"documents":[]}"#;
        assert_eq!(parse_match_count(body), Ok(0));
    }

    #[test]
    fn test_documents_without_meta() {
        assert_eq!(parse_match_count(r#"{"documents":[{},{}]}"#), Ok(2));
    }

    #[test]
    fn test_malformed_body() {
        assert!(matches!(
            parse_match_count("<html>"),
            Err(LookupFailure::Malformed(_))
        ));
    }

    #[test]
    fn test_request_params() {
        let query = PlaceQuery {
            query: "강남역 대학교".to_string(),
            category_filter: "SC4".to_string(),
            radius_m: 500,
        };
        assert_eq!(
            request_params(&query),
            vec![
                ("query", "강남역 대학교".to_string()),
                ("category_group_code", "SC4".to_string()),
                ("radius", "500".to_string()),
                ("size", "1".to_string()),
            ]
        );

        let unfiltered = PlaceQuery {
            category_filter: String::new(),
            ..query
        };
        assert!(request_params(&unfiltered)
            .iter()
            .all(|(name, _)| *name != "category_group_code"));
    }

    #[test]
    fn test_rejection_message() {
        let failure = rejection(
            StatusCode::UNAUTHORIZED,
            r#"{"errorType":"AccessDeniedError","message":"wrong appKey"}"#,
        );
        assert_eq!(
            failure,
            LookupFailure::Rejected {
                status: 401,
                message: "AccessDeniedError: wrong appKey".to_string()
            }
        );

        let failure = rejection(StatusCode::BAD_GATEWAY, "");
        assert_eq!(
            failure,
            LookupFailure::Rejected {
                status: 502,
                message: "Bad Gateway".to_string()
            }
        );
    }
}
