//! Station feature classification
//!
//! Maps a station name to a [`StationProfile`]: the feature categories found
//! around the station and the demographic target codes derived from them.
//!
//! Two strategies implement [`Classifier`]:
//! - [`StaticClassifier`]: membership in fixed category tables, multi-target
//! - [`PlaceSearchClassifier`]: priority-ordered place-search lookups,
//!   single primary target
//!
//! Which one runs is chosen by configuration ([`ClassifierStrategy`]).

mod place_search;
mod static_table;

pub use place_search::{
    LookupFailure, PlaceQuery, PlaceSearch, PlaceSearchClassifier, PriorityEntry,
    DEFAULT_PRIORITIES, DEFAULT_SEARCH_RADIUS_M,
};
pub use static_table::{CategoryTable, StaticClassifier};

use crate::station;
use crate::tags::{join_tags, split_tags, Feature, TargetCode};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Classification result for one station
///
/// `target_tags` is never empty: a profile without any mapped target carries
/// exactly `{General}`, and so does a profile without features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationProfile {
    /// Trimmed label as supplied by the caller
    pub station_name: String,
    pub feature_tags: BTreeSet<Feature>,
    pub target_tags: BTreeSet<TargetCode>,
}

impl StationProfile {
    pub fn new(
        station_name: impl Into<String>,
        feature_tags: BTreeSet<Feature>,
        mut target_tags: BTreeSet<TargetCode>,
    ) -> Self {
        if feature_tags.is_empty() || target_tags.is_empty() {
            target_tags = BTreeSet::from([TargetCode::General]);
        }
        Self {
            station_name: station::display_name(&station_name.into()),
            feature_tags,
            target_tags,
        }
    }

    /// Profile of a station with no known surroundings
    pub fn general(station_name: impl Into<String>) -> Self {
        Self::new(station_name, BTreeSet::new(), BTreeSet::new())
    }

    /// Rebuild a profile from its serialized tag lists
    ///
    /// Unknown tag names are dropped with a warning so that a stale dataset
    /// never blocks scoring.
    pub fn from_lists(station_name: &str, feature_list: &str, target_list: &str) -> Self {
        let feature_tags = split_tags(feature_list)
            .filter_map(|name| match name.parse::<Feature>() {
                Ok(feature) => Some(feature),
                Err(e) => {
                    warn!(station = station_name, "Dropping feature tag: {}", e);
                    None
                }
            })
            .collect();
        let target_tags = split_tags(target_list)
            .filter_map(|name| match name.parse::<TargetCode>() {
                Ok(code) => Some(code),
                Err(e) => {
                    warn!(station = station_name, "Dropping target tag: {}", e);
                    None
                }
            })
            .collect();
        Self::new(station_name, feature_tags, target_tags)
    }

    /// Normalized lookup key for this station
    pub fn join_key(&self) -> String {
        station::join_key(&self.station_name)
    }

    /// Features as a sorted `|`-joined list (empty string when none)
    pub fn feature_list(&self) -> String {
        join_tags(&self.feature_tags)
    }

    /// Targets as a sorted `|`-joined list
    pub fn target_list(&self) -> String {
        join_tags(&self.target_tags)
    }
}

/// Station classification capability
///
/// Implementations never fail the whole station: lookup problems degrade to a
/// profile with fewer (or no) features.
pub trait Classifier {
    fn classify(&self, station_name: &str) -> StationProfile;

    /// Classify a batch, preserving input order
    fn classify_all(&self, station_names: &[String]) -> Vec<StationProfile> {
        station_names
            .iter()
            .map(|name| self.classify(name))
            .collect()
    }
}

/// Configured classification strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierStrategy {
    #[default]
    Static,
    PlaceSearch,
}

impl fmt::Display for ClassifierStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierStrategy::Static => f.write_str("static"),
            ClassifierStrategy::PlaceSearch => f.write_str("place_search"),
        }
    }
}

impl FromStr for ClassifierStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "static" => Ok(ClassifierStrategy::Static),
            "place_search" | "poi" => Ok(ClassifierStrategy::PlaceSearch),
            other => Err(Error::InvalidInput(format!(
                "Unknown classifier strategy: {}",
                other
            ))),
        }
    }
}

/// Profiles indexed by normalized station name
#[derive(Debug, Clone, Default)]
pub struct ProfileDirectory {
    by_key: BTreeMap<String, StationProfile>,
}

impl ProfileDirectory {
    /// Later profiles replace earlier ones sharing the same key
    pub fn from_profiles(profiles: impl IntoIterator<Item = StationProfile>) -> Self {
        let by_key = profiles
            .into_iter()
            .map(|profile| (profile.join_key(), profile))
            .collect();
        Self { by_key }
    }

    pub fn get(&self, station_name: &str) -> Option<&StationProfile> {
        self.by_key.get(&station::join_key(station_name))
    }

    /// Like [`get`](Self::get) but an unknown station is an error
    pub fn require(&self, station_name: &str) -> Result<&StationProfile> {
        self.get(station_name)
            .ok_or_else(|| Error::NotFound(format!("No profile for station: {}", station_name)))
    }

    pub fn station_names(&self) -> Vec<&str> {
        self.by_key
            .values()
            .map(|p| p.station_name.as_str())
            .collect()
    }

    /// Profiles ordered by normalized name
    pub fn into_profiles(self) -> Vec<StationProfile> {
        self.by_key.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_features_default_to_general() {
        let profile = StationProfile::general(" 도봉 ");
        assert_eq!(profile.station_name, "도봉");
        assert!(profile.feature_tags.is_empty());
        assert_eq!(profile.target_tags, BTreeSet::from([TargetCode::General]));
        assert_eq!(profile.feature_list(), "");
        assert_eq!(profile.target_list(), "General");
    }

    #[test]
    fn test_unmapped_features_still_yield_general() {
        let profile = StationProfile::new(
            "구로",
            BTreeSet::from([Feature::GeneralHospital]),
            BTreeSet::new(),
        );
        assert_eq!(profile.target_tags, BTreeSet::from([TargetCode::General]));
        assert_eq!(profile.feature_list(), "GeneralHospital");
    }

    #[test]
    fn test_from_lists_drops_unknown_tags() {
        let profile = StationProfile::from_lists("시청", "Office|Casino|TransferHub", "Office|Transfer|Tourist");
        assert_eq!(
            profile.feature_tags,
            BTreeSet::from([Feature::Office, Feature::TransferHub])
        );
        assert_eq!(
            profile.target_tags,
            BTreeSet::from([TargetCode::Office, TargetCode::Transfer])
        );
    }

    #[test]
    fn test_directory_lookup_ignores_station_suffix() {
        let directory = ProfileDirectory::from_profiles(vec![StationProfile::general("서울역")]);
        assert!(directory.get("서울").is_some());
        assert!(directory.get("서울역").is_some());
        assert!(matches!(directory.require("부산"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("static".parse::<ClassifierStrategy>().unwrap(), ClassifierStrategy::Static);
        assert_eq!(
            "place-search".parse::<ClassifierStrategy>().unwrap(),
            ClassifierStrategy::PlaceSearch
        );
        assert!("magic".parse::<ClassifierStrategy>().is_err());
    }
}
