//! Historical ridership aggregation
//!
//! The ridership export is wide: one row per station, day and direction, with
//! one count column per hour bucket. Aggregation unpivots those columns,
//! parses the counts, and averages them per (station, hour key, direction)
//! into long-format [`HistoricalAggregate`] records.
//!
//! Hour keys follow the export's buckets: "06시 이전" (before 6 AM) is key 5,
//! "24시 이후" (after midnight) is key 24, and "07시-08시" is key 7.

use crate::station;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Hour key for the bucket before the first regular hour
pub const PRE_OPEN_HOUR_KEY: u8 = 5;

/// Hour key for the bucket after midnight
pub const POST_MIDNIGHT_HOUR_KEY: u8 = 24;

/// Boarding or alighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Boarding,
    Alighting,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Boarding => "boarding",
            Direction::Alighting => "alighting",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "승차" | "boarding" | "on" | "get_on" => Ok(Direction::Boarding),
            "하차" | "alighting" | "off" | "get_off" => Ok(Direction::Alighting),
            other => Err(Error::MalformedInput(format!("Unknown direction: {}", other))),
        }
    }
}

/// Hour key for a bucket label, or None when the label is not an hour bucket
///
/// Accepts the export's Korean labels ("06시 이전", "07시-08시", "24시 이후")
/// as well as plain ranges ("07-08").
pub fn hour_key_from_label(label: &str) -> Option<u8> {
    let label = label.trim();
    let lower = label.to_ascii_lowercase();

    if label.contains("이전") || lower.starts_with("before") {
        return Some(PRE_OPEN_HOUR_KEY);
    }
    if label.contains("이후") || lower.starts_with("after") {
        return Some(POST_MIDNIGHT_HOUR_KEY);
    }

    let digits_end = label
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)?;
    if digits_end == 0 {
        return None;
    }
    let rest = &label[digits_end..];
    if !rest.starts_with(&['시', '-', '~'][..]) {
        return None;
    }

    label[..digits_end]
        .parse::<u8>()
        .ok()
        .filter(|hour| *hour <= POST_MIDNIGHT_HOUR_KEY)
}

/// Parse a count cell, removing thousands separators
pub fn parse_count(raw: &str) -> Result<u64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned
        .parse::<u64>()
        .map_err(|_| Error::MalformedInput(format!("Unparseable count: {:?}", raw)))
}

/// One wide source row: a station, a direction, and its hour-bucket cells
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideRow {
    pub station_name: String,
    pub direction: Direction,
    /// (bucket label, raw count) in column order
    pub buckets: Vec<(String, String)>,
}

/// Average count for one (station, hour key, direction)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalAggregate {
    pub station_name: String,
    pub hour: u8,
    pub direction: Direction,
    pub average_count: u64,
}

/// A cell left out of the averages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedCell {
    pub station_name: String,
    pub label: String,
    pub reason: String,
}

/// Aggregation output, sorted by (station, hour, direction)
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub aggregates: Vec<HistoricalAggregate>,
    pub dropped: Vec<DroppedCell>,
}

/// Unpivot, parse and average wide rows
///
/// Unparseable cells are dropped and reported; they do not fail the batch.
/// A non-empty batch in which no cell is usable is structurally invalid.
pub fn aggregate(rows: &[WideRow]) -> Result<Aggregation> {
    let mut groups: BTreeMap<(String, u8, Direction), (u64, u64)> = BTreeMap::new();
    let mut dropped = Vec::new();

    for row in rows {
        let station_name = station::display_name(&row.station_name);

        for (label, raw) in &row.buckets {
            let recorded = hour_key_from_label(label)
                .ok_or_else(|| Error::MalformedInput(format!("Not an hour bucket: {:?}", label)))
                .and_then(|hour| parse_count(raw).map(|count| (hour, count)))
                .and_then(|(hour, count)| {
                    let entry = groups
                        .entry((station_name.clone(), hour, row.direction))
                        .or_insert((0, 0));
                    entry.0 = entry.0.checked_add(count).ok_or_else(|| {
                        Error::MalformedInput(format!("Count overflows the hour total: {:?}", raw))
                    })?;
                    entry.1 += 1;
                    Ok(())
                });

            if let Err(e) = recorded {
                warn!(station = %station_name, label = %label, "Dropping cell: {}", e);
                dropped.push(DroppedCell {
                    station_name: station_name.clone(),
                    label: label.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if !rows.is_empty() && groups.is_empty() {
        return Err(Error::InvalidInput(format!(
            "No usable hour-bucket counts in {} rows",
            rows.len()
        )));
    }

    let aggregates: Vec<HistoricalAggregate> = groups
        .into_iter()
        .map(|((station_name, hour, direction), (sum, n))| HistoricalAggregate {
            station_name,
            hour,
            direction,
            average_count: rounded_mean(sum, n),
        })
        .collect();

    debug!(
        rows = rows.len(),
        aggregates = aggregates.len(),
        dropped = dropped.len(),
        "Aggregated historical rows"
    );

    Ok(Aggregation {
        aggregates,
        dropped,
    })
}

/// Integer mean, rounding halves up
///
/// The mean of u64 values never exceeds u64::MAX.
fn rounded_mean(sum: u64, n: u64) -> u64 {
    let (sum, n) = (u128::from(sum), u128::from(n));
    let mean = sum / n + u128::from(sum % n * 2 >= n);
    u64::try_from(mean).unwrap_or(u64::MAX)
}

/// Aggregates keyed by (station join key, hour, direction)
#[derive(Debug, Clone, Default)]
pub struct HistoricalIndex {
    by_key: HashMap<(String, u8, Direction), u64>,
}

impl HistoricalIndex {
    /// The first aggregate wins when two share a key
    pub fn from_aggregates(aggregates: &[HistoricalAggregate]) -> Self {
        let mut by_key = HashMap::with_capacity(aggregates.len());
        for agg in aggregates {
            let key = (station::join_key(&agg.station_name), agg.hour, agg.direction);
            if by_key.contains_key(&key) {
                debug!(station = %agg.station_name, hour = agg.hour, "Duplicate aggregate key, keeping first");
                continue;
            }
            by_key.insert(key, agg.average_count);
        }
        Self { by_key }
    }

    pub fn get(&self, station_name: &str, hour: u8, direction: Direction) -> Option<u64> {
        self.by_key
            .get(&(station::join_key(station_name), hour, direction))
            .copied()
    }

    pub fn alighting(&self, station_name: &str, hour: u8) -> Option<u64> {
        self.get(station_name, hour, Direction::Alighting)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
