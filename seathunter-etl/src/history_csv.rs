//! Reader for the wide hourly boarding/alighting CSV export
//!
//! One row per (month, line, station, direction) with one count column per
//! hour bucket ("06시 이전", "07시-08시", ..., "24시 이후"). Identifier columns
//! other than station and direction are ignored.

use csv::StringRecord;
use seathunter_common::history::{hour_key_from_label, WideRow};
use seathunter_common::station;
use seathunter_common::{Direction, Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Accepted headers for the station-name column
const STATION_COLUMNS: &[&str] = &["역명", "역이름", "STTN", "station_name"];

/// Accepted headers for the boarding/alighting column
const DIRECTION_COLUMNS: &[&str] = &["구분", "승하차구분", "type", "direction"];

/// Column positions resolved from the header row
#[derive(Debug, Clone, PartialEq, Eq)]
struct WideLayout {
    station_idx: usize,
    direction_idx: usize,
    /// (column index, bucket label)
    buckets: Vec<(usize, String)>,
}

fn header_name(raw: &str) -> &str {
    raw.trim_start_matches('\u{feff}').trim()
}

fn find_column(headers: &StringRecord, candidates: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let name = header_name(h);
        candidates.iter().any(|c| c.eq_ignore_ascii_case(name))
    })
}

fn detect_layout(headers: &StringRecord) -> Result<WideLayout> {
    let station_idx = find_column(headers, STATION_COLUMNS).ok_or_else(|| {
        Error::InvalidInput(format!(
            "No station name column (expected one of {:?})",
            STATION_COLUMNS
        ))
    })?;
    let direction_idx = find_column(headers, DIRECTION_COLUMNS).ok_or_else(|| {
        Error::InvalidInput(format!(
            "No direction column (expected one of {:?})",
            DIRECTION_COLUMNS
        ))
    })?;

    let buckets: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != station_idx && *idx != direction_idx)
        .map(|(idx, h)| (idx, header_name(h).to_string()))
        .filter(|(_, label)| hour_key_from_label(label).is_some())
        .collect();

    if buckets.is_empty() {
        return Err(Error::InvalidInput(
            "No hour-bucket columns in header".to_string(),
        ));
    }

    Ok(WideLayout {
        station_idx,
        direction_idx,
        buckets,
    })
}

/// Parse wide rows from any reader
///
/// A header without station, direction or hour-bucket columns is fatal. Rows
/// with an unrecognised direction or a blank station are skipped; individual
/// count cells are passed through untouched for the aggregator to judge.
pub fn read_wide_rows<R: Read>(reader: R) -> Result<Vec<WideRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b',')
        .flexible(true)
        .from_reader(reader);

    let layout = detect_layout(reader.headers()?)?;
    debug!(
        station_column = layout.station_idx,
        direction_column = layout.direction_idx,
        buckets = layout.buckets.len(),
        "Detected wide CSV layout"
    );

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    let mut record = StringRecord::new();

    while reader.read_record(&mut record)? {
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let station_name = station::clean_label(record.get(layout.station_idx).unwrap_or(""));
        if station_name.is_empty() {
            warn!(line, "Skipping row without station name");
            skipped += 1;
            continue;
        }

        let direction = match record
            .get(layout.direction_idx)
            .unwrap_or("")
            .parse::<Direction>()
        {
            Ok(direction) => direction,
            Err(e) => {
                warn!(line, station = %station_name, "Skipping row: {}", e);
                skipped += 1;
                continue;
            }
        };

        let buckets = layout
            .buckets
            .iter()
            .filter_map(|(idx, label)| record.get(*idx).map(|raw| (label.clone(), raw.to_string())))
            .collect();

        rows.push(WideRow {
            station_name,
            direction,
            buckets,
        });
    }

    info!(rows = rows.len(), skipped, "Read wide historical rows");
    Ok(rows)
}

/// Parse a wide CSV file
pub fn read_wide_csv(path: &Path) -> Result<Vec<WideRow>> {
    let file = File::open(path)?;
    read_wide_rows(file)
}
