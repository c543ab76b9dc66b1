//! # Seat Hunter ETL
//!
//! Batch jobs feeding the Seat Hunter store:
//! - Wide hourly boarding/alighting CSV ingestion
//! - Place-search backed station classification (Kakao Local)
//! - Real-time arrival collection (Seoul open API) into snapshot files
//! - Monthly hourly ridership download (Seoul open API) as a second history source

pub mod card_history;
pub mod collector;
pub mod history_csv;
pub mod kakao;
pub mod retry;
pub mod seoul_api;

pub use card_history::{history_months, CardHistoryClient, HistoryApiError, HistoryFetch};
pub use collector::{run_collector, run_collector_until, ArrivalSource, CollectorSettings, CollectorSummary};
pub use history_csv::{read_wide_csv, read_wide_rows};
pub use kakao::KakaoPlaceSearch;
pub use retry::RetryPolicy;
pub use seoul_api::{ArrivalApiError, SeoulArrivalClient};
