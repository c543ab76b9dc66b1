//! Real-time arrival observations and snapshot files
//!
//! Each collection cycle writes one `arrivals_YYYYMMDD_HHMMSS.json` file:
//!
//! ```json
//! { "collected_at": "2024-09-02T08:15:30.120391",
//!   "arrivals": [ { "station_name": "서울", "train_line": "소요산행 - 시청방면",
//!                   "arrival_message": "전역 출발", "arrival_time_sec": "45" } ] }
//! ```
//!
//! Files are never rewritten. `collected_at` is local wall-clock time; its hour
//! is the join key against historical hour buckets.

use crate::station;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name prefix of arrival snapshots
pub const SNAPSHOT_PREFIX: &str = "arrivals_";

/// One train approaching a station, at observation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeObservation {
    pub station_name: String,
    pub train_line: String,
    pub status_message: String,
    /// None when the feed did not say
    pub seconds_until_arrival: Option<u32>,
    /// Local wall-clock time of the collection cycle
    pub observed_at: NaiveDateTime,
}

impl RealtimeObservation {
    /// Hour-of-day join key (0-23)
    pub fn hour_key(&self) -> u8 {
        self.observed_at.hour() as u8
    }
}

/// Arrival entry as stored in a snapshot file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalRecord {
    pub station_name: String,
    #[serde(default)]
    pub train_line: String,
    #[serde(default)]
    pub arrival_message: String,
    /// Stored as a number; older files carry it as a string
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub arrival_time_sec: Option<u32>,
}

/// Snapshot file body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalSnapshot {
    pub collected_at: String,
    #[serde(default)]
    pub arrivals: Vec<ArrivalRecord>,
}

impl ArrivalSnapshot {
    pub fn new(collected_at: NaiveDateTime, arrivals: Vec<ArrivalRecord>) -> Self {
        Self {
            collected_at: collected_at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            arrivals,
        }
    }

    /// Stamp every arrival with the cycle's collection time
    pub fn observations(&self) -> Result<Vec<RealtimeObservation>> {
        let observed_at = parse_observed_at(&self.collected_at)?;
        Ok(self
            .arrivals
            .iter()
            .map(|arrival| RealtimeObservation {
                station_name: station::display_name(&arrival.station_name),
                train_line: arrival.train_line.clone(),
                status_message: arrival.arrival_message.clone(),
                seconds_until_arrival: arrival.arrival_time_sec,
                observed_at,
            })
            .collect())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSeconds {
    Integer(i64),
    Float(f64),
    Text(String),
}

/// Accept seconds as number, numeric string, or null; anything else is unknown
fn lenient_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawSeconds>::deserialize(deserializer)?;
    Ok(match raw {
        Some(RawSeconds::Integer(n)) => u32::try_from(n).ok(),
        Some(RawSeconds::Float(f)) if f >= 0.0 && f <= u32::MAX as f64 => Some(f as u32),
        Some(RawSeconds::Float(_)) => None,
        Some(RawSeconds::Text(text)) => text.trim().parse::<u32>().ok(),
        None => None,
    })
}

/// Parse an ISO-8601 collection timestamp into local wall-clock time
///
/// An explicit offset is honored by keeping the wall-clock reading at that
/// offset; naive timestamps are taken as-is.
pub fn parse_observed_at(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Ok(with_offset.naive_local());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|_| Error::MalformedInput(format!("Unparseable timestamp: {:?}", raw)))
}

/// `arrivals_YYYYMMDD_HHMMSS.json`
pub fn snapshot_file_name(at: NaiveDateTime) -> String {
    format!("{}{}.json", SNAPSHOT_PREFIX, at.format("%Y%m%d_%H%M%S"))
}

/// Write a snapshot as a new file in `dir`
pub fn write_snapshot(dir: &Path, snapshot: &ArrivalSnapshot, at: NaiveDateTime) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(snapshot_file_name(at));
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => {
                Error::InvalidInput(format!("Snapshot already exists: {}", path.display()))
            }
            _ => Error::Io(e),
        })?;

    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, snapshot)?;
    debug!(path = %path.display(), arrivals = snapshot.arrivals.len(), "Wrote arrival snapshot");
    Ok(path)
}

/// Observations from every snapshot file in a directory
#[derive(Debug, Clone, Default)]
pub struct SnapshotBatch {
    pub observations: Vec<RealtimeObservation>,
    pub files_read: usize,
    pub files_skipped: usize,
}

/// Load all snapshots in `dir`, oldest file first
///
/// Unreadable or malformed files are skipped with a warning.
pub fn load_snapshot_dir(dir: &Path) -> Result<SnapshotBatch> {
    if !dir.is_dir() {
        return Err(Error::NotFound(format!(
            "Snapshot directory not found: {}",
            dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_snapshot_file(path))
        .collect();
    paths.sort();

    let mut batch = SnapshotBatch::default();
    for path in paths {
        match read_snapshot(&path).and_then(|s| s.observations()) {
            Ok(observations) => {
                batch.files_read += 1;
                batch.observations.extend(observations);
            }
            Err(e) => {
                warn!(path = %path.display(), "Skipping snapshot: {}", e);
                batch.files_skipped += 1;
            }
        }
    }

    info!(
        files = batch.files_read,
        skipped = batch.files_skipped,
        observations = batch.observations.len(),
        "Loaded arrival snapshots from {}",
        dir.display()
    );
    Ok(batch)
}

pub fn read_snapshot(path: &Path) -> Result<ArrivalSnapshot> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

fn is_snapshot_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(SNAPSHOT_PREFIX) && n.ends_with(".json"))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 9, 2)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_parse_observed_at_variants() {
        assert_eq!(parse_observed_at("2024-09-02T08:15:30.120391").unwrap().hour(), 8);
        assert_eq!(parse_observed_at("2024-09-02T08:15:30").unwrap(), at(8, 15, 30));
        assert_eq!(parse_observed_at("2024-09-02 23:59:59").unwrap().hour(), 23);
        // Wall clock at the stated offset, not converted to UTC
        assert_eq!(parse_observed_at("2024-09-02T08:15:30+09:00").unwrap().hour(), 8);
        assert!(matches!(
            parse_observed_at("yesterday"),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_seconds_accept_string_number_and_garbage() {
        let snapshot: ArrivalSnapshot = serde_json::from_str(
            r#"{"collected_at": "2024-09-02T08:00:00",
                "arrivals": [
                  {"station_name": "서울", "train_line": "a", "arrival_message": "m", "arrival_time_sec": "45"},
                  {"station_name": "서울", "train_line": "b", "arrival_message": "m", "arrival_time_sec": 90},
                  {"station_name": "서울", "train_line": "c", "arrival_message": "m", "arrival_time_sec": "soon"},
                  {"station_name": "서울", "train_line": "d", "arrival_message": "m", "arrival_time_sec": -1},
                  {"station_name": "서울"}
                ]}"#,
        )
        .unwrap();

        let seconds: Vec<Option<u32>> =
            snapshot.arrivals.iter().map(|a| a.arrival_time_sec).collect();
        assert_eq!(seconds, vec![Some(45), Some(90), None, None, None]);
    }

    #[test]
    fn test_observations_carry_collection_hour() {
        let snapshot = ArrivalSnapshot::new(
            at(8, 42, 0),
            vec![ArrivalRecord {
                station_name: " 강남 ".into(),
                train_line: "성수행".into(),
                arrival_message: "2분 후".into(),
                arrival_time_sec: Some(120),
            }],
        );
        let observations = snapshot.observations().unwrap();

        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].station_name, "강남");
        assert_eq!(observations[0].hour_key(), 8);
        assert_eq!(observations[0].status_message, "2분 후");
    }

    #[test]
    fn test_write_then_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        let record = ArrivalRecord {
            station_name: "서울".into(),
            train_line: "인천행".into(),
            arrival_message: "진입".into(),
            arrival_time_sec: Some(30),
        };

        let first = ArrivalSnapshot::new(at(8, 0, 0), vec![record.clone()]);
        let second = ArrivalSnapshot::new(at(9, 0, 0), vec![record.clone(), record]);
        write_snapshot(dir.path(), &first, at(8, 0, 0)).unwrap();
        write_snapshot(dir.path(), &second, at(9, 0, 0)).unwrap();
        std::fs::write(dir.path().join("arrivals_broken.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let batch = load_snapshot_dir(dir.path()).unwrap();
        assert_eq!(batch.files_read, 2);
        assert_eq!(batch.files_skipped, 1);
        assert_eq!(batch.observations.len(), 3);
        assert_eq!(batch.observations[0].hour_key(), 8);
        assert_eq!(batch.observations[2].hour_key(), 9);
    }

    #[test]
    fn test_snapshot_files_are_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = ArrivalSnapshot::new(at(8, 0, 0), Vec::new());
        let path = write_snapshot(dir.path(), &snapshot, at(8, 0, 0)).unwrap();
        let original = std::fs::read_to_string(&path).unwrap();

        let later = ArrivalSnapshot::new(at(8, 0, 0), vec![ArrivalRecord {
            station_name: "시청".into(),
            train_line: "성수행".into(),
            arrival_message: "전역 출발".into(),
            arrival_time_sec: Some(90),
        }]);
        let err = write_snapshot(dir.path(), &later, at(8, 0, 0)).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_missing_directory_is_not_found() {
        let err = load_snapshot_dir(Path::new("/nonexistent/seathunter/raw")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
