//! Station coordinates for map-ready report exports

use crate::station;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// WGS84 position of a station entrance
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Station → coordinate lookup, keyed by join key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinateTable {
    by_key: BTreeMap<String, Coordinate>,
}

/// On-disk form of a coordinate table
///
/// ```toml
/// [stations]
/// "서울역" = { latitude = 37.554648, longitude = 126.972559 }
/// ```
#[derive(Debug, Deserialize)]
struct CoordinateTableFile {
    #[serde(default)]
    stations: BTreeMap<String, Coordinate>,
}

impl CoordinateTable {
    pub fn new(entries: impl IntoIterator<Item = (String, Coordinate)>) -> Self {
        let by_key = entries
            .into_iter()
            .map(|(name, coordinate)| (station::join_key(&name), coordinate))
            .collect();
        Self { by_key }
    }

    /// Built-in positions for the busiest downtown stations
    pub fn seoul_landmarks() -> Self {
        let entries = [
            ("서울", 37.554648, 126.972559),
            ("강남", 37.497942, 127.027621),
            ("홍대입구", 37.556761, 126.923612),
            ("신도림", 37.508725, 126.891295),
            ("잠실", 37.513261, 127.100133),
            ("시청", 37.563588, 126.977156),
            ("종각", 37.570161, 126.982923),
            ("종로3가", 37.570406, 126.991847),
            ("여의도", 37.521574, 126.924340),
        ];
        Self::new(entries.into_iter().map(|(name, latitude, longitude)| {
            (name.to_string(), Coordinate { latitude, longitude })
        }))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CoordinateTableFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid coordinate table: {}", e)))?;

        for (name, coordinate) in &file.stations {
            if !(-90.0..=90.0).contains(&coordinate.latitude)
                || !(-180.0..=180.0).contains(&coordinate.longitude)
            {
                return Err(Error::Config(format!(
                    "Coordinate out of range for {}: ({}, {})",
                    name, coordinate.latitude, coordinate.longitude
                )));
            }
        }
        Ok(Self::new(file.stations))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn get(&self, station_name: &str) -> Option<Coordinate> {
        self.by_key.get(&station::join_key(station_name)).copied()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
