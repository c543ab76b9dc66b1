//! Real-time congestion reconciliation
//!
//! Left-joins real-time arrivals onto historical alighting averages by
//! (normalized station name, hour key) and flags platforms where a large
//! crowd is about to get off an imminent train.

use crate::history::{HistoricalAggregate, HistoricalIndex};
use crate::realtime::RealtimeObservation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Expected alighting count above which an imminent arrival is high risk
pub const HIGH_RISK_ALIGHTING_COUNT: u64 = 5000;

/// An arrival within this many seconds is imminent
pub const IMMINENT_ARRIVAL_SECS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Normal,
    HighRisk,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Normal => "normal",
            RiskLevel::HighRisk => "high_risk",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One real-time arrival annotated with its historical expectation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CongestionReportRow {
    pub station_name: String,
    pub train_line: String,
    pub status_message: String,
    /// Historical alighting average for the hour; 0 when unmatched
    pub expected_alighting_count: u64,
    /// Whether a historical aggregate was found
    pub matched: bool,
    pub risk_level: RiskLevel,
}

/// Unknown arrival time is never imminent
pub fn classify_risk(expected_alighting_count: u64, seconds_until_arrival: Option<u32>) -> RiskLevel {
    match seconds_until_arrival {
        Some(secs)
            if expected_alighting_count > HIGH_RISK_ALIGHTING_COUNT
                && secs <= IMMINENT_ARRIVAL_SECS =>
        {
            RiskLevel::HighRisk
        }
        _ => RiskLevel::Normal,
    }
}

/// Join real-time observations with historical aggregates
///
/// Produces exactly one row per observation, ordered by expected alighting
/// count (highest first) with unmatched rows last. Ties keep input order.
pub fn reconcile(
    historical: &[HistoricalAggregate],
    realtime: &[RealtimeObservation],
) -> Vec<CongestionReportRow> {
    reconcile_with_index(&HistoricalIndex::from_aggregates(historical), realtime)
}

/// [`reconcile`] against a prebuilt index
pub fn reconcile_with_index(
    index: &HistoricalIndex,
    realtime: &[RealtimeObservation],
) -> Vec<CongestionReportRow> {
    let mut rows: Vec<CongestionReportRow> = realtime
        .iter()
        .map(|obs| {
            let expected = index.alighting(&obs.station_name, obs.hour_key());
            let expected_alighting_count = expected.unwrap_or(0);
            CongestionReportRow {
                station_name: obs.station_name.clone(),
                train_line: obs.train_line.clone(),
                status_message: obs.status_message.clone(),
                expected_alighting_count,
                matched: expected.is_some(),
                risk_level: classify_risk(expected_alighting_count, obs.seconds_until_arrival),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.matched
            .cmp(&a.matched)
            .then(b.expected_alighting_count.cmp(&a.expected_alighting_count))
    });
    rows
}
