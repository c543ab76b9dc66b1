//! Place-search driven classification
//!
//! Each station is searched with one query per [`PriorityEntry`] ("강남역 대학교",
//! restricted to a category group and a radius). Every entry with at least one
//! match is recorded as a feature; the first matching entry in priority order
//! decides the station's single target code.

use super::{Classifier, StationProfile};
use crate::station;
use crate::tags::{Feature, TargetCode};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, warn};

/// Search radius around the station, meters
pub const DEFAULT_SEARCH_RADIUS_M: u32 = 500;

/// Why a single place-search lookup produced no answer
///
/// Contained per category: the category is treated as absent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupFailure {
    #[error("Place search transport error: {0}")]
    Transport(String),

    #[error("Place search rejected with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Place search still rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Malformed place search response: {0}")]
    Malformed(String),
}

/// One place-search request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceQuery {
    pub query: String,
    /// Provider category group code; empty means unfiltered
    pub category_filter: String,
    pub radius_m: u32,
}

/// External place-search capability
pub trait PlaceSearch {
    /// Number of places matching the query (0 when nothing matches)
    fn search(&self, query: &PlaceQuery) -> Result<u32, LookupFailure>;
}

impl<S: PlaceSearch + ?Sized> PlaceSearch for &S {
    fn search(&self, query: &PlaceQuery) -> Result<u32, LookupFailure> {
        (**self).search(query)
    }
}

/// One lookup in the priority list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityEntry {
    pub target: TargetCode,
    pub feature: Feature,
    /// Appended to the station name to form the query
    pub keyword: &'static str,
    pub category_filter: &'static str,
}

/// Highest priority first
pub const DEFAULT_PRIORITIES: [PriorityEntry; 7] = [
    PriorityEntry {
        target: TargetCode::UnivStudent,
        feature: Feature::University,
        keyword: "대학교",
        category_filter: "SC4",
    },
    PriorityEntry {
        target: TargetCode::Transfer,
        feature: Feature::TransferCenter,
        keyword: "환승센터",
        category_filter: "",
    },
    PriorityEntry {
        target: TargetCode::Senior,
        feature: Feature::GeneralHospital,
        keyword: "종합병원",
        category_filter: "HP8",
    },
    PriorityEntry {
        target: TargetCode::Senior,
        feature: Feature::TraditionalMarket,
        keyword: "전통시장",
        category_filter: "",
    },
    PriorityEntry {
        target: TargetCode::Office,
        feature: Feature::DistrictOffice,
        keyword: "구청",
        category_filter: "PO3",
    },
    PriorityEntry {
        target: TargetCode::Office,
        feature: Feature::IndustrialComplex,
        keyword: "산업단지",
        category_filter: "",
    },
    PriorityEntry {
        target: TargetCode::Hotplace,
        feature: Feature::FoodStreet,
        keyword: "먹자골목",
        category_filter: "FD6",
    },
];

/// Fold state for the priority scan
struct Scan {
    features: BTreeSet<Feature>,
    primary: TargetCode,
    primary_assigned: bool,
}

/// Single-target classifier backed by a [`PlaceSearch`] collaborator
pub struct PlaceSearchClassifier<S> {
    search: S,
    priorities: Vec<PriorityEntry>,
    radius_m: u32,
}

impl<S: PlaceSearch> PlaceSearchClassifier<S> {
    pub fn new(search: S) -> Self {
        Self {
            search,
            priorities: DEFAULT_PRIORITIES.to_vec(),
            radius_m: DEFAULT_SEARCH_RADIUS_M,
        }
    }

    pub fn with_radius(mut self, radius_m: u32) -> Self {
        self.radius_m = radius_m;
        self
    }

    fn query_for(&self, station_name: &str, entry: &PriorityEntry) -> PlaceQuery {
        PlaceQuery {
            query: format!("{} {}", station::search_label(station_name), entry.keyword),
            category_filter: entry.category_filter.to_string(),
            radius_m: self.radius_m,
        }
    }

    /// Whether the entry's category exists near the station; failures count as absent
    fn has_match(&self, station_name: &str, entry: &PriorityEntry) -> bool {
        let query = self.query_for(station_name, entry);
        match self.search.search(&query) {
            Ok(count) => count > 0,
            Err(failure) => {
                warn!(
                    station = station_name,
                    keyword = entry.keyword,
                    "Category lookup failed, recording as absent: {}",
                    failure
                );
                false
            }
        }
    }
}

impl<S: PlaceSearch> Classifier for PlaceSearchClassifier<S> {
    fn classify(&self, station_name: &str) -> StationProfile {
        let initial = Scan {
            features: BTreeSet::new(),
            primary: TargetCode::General,
            primary_assigned: false,
        };

        let scan = self.priorities.iter().fold(initial, |mut scan, entry| {
            if self.has_match(station_name, entry) {
                scan.features.insert(entry.feature);
                if !scan.primary_assigned {
                    scan.primary = entry.target;
                    scan.primary_assigned = true;
                }
            }
            scan
        });

        debug!(
            station = station_name,
            primary = %scan.primary,
            features = scan.features.len(),
            "Classified station from place search"
        );

        StationProfile::new(station_name, scan.features, BTreeSet::from([scan.primary]))
    }
}
