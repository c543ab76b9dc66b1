//! Static category-membership classification
//!
//! The category tables are immutable values built once at startup (either the
//! built-in Seoul lines 1-4 table or a TOML file) and handed to the
//! classifier explicitly.

use super::{Classifier, StationProfile};
use crate::station;
use crate::tags::{Feature, TargetCode};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Category → member stations, plus the fixed feature → target mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTable {
    /// Member names are stored as join keys
    memberships: BTreeMap<Feature, BTreeSet<String>>,
    targets: BTreeMap<Feature, TargetCode>,
}

/// On-disk form of a category table
///
/// ```toml
/// [categories]
/// Terminal = ["서울역", "용산"]
///
/// [targets]
/// Terminal = "Traveler"
/// ```
#[derive(Debug, Deserialize)]
struct CategoryTableFile {
    categories: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    targets: BTreeMap<String, String>,
}

impl CategoryTable {
    pub fn new(
        memberships: BTreeMap<Feature, Vec<String>>,
        targets: BTreeMap<Feature, TargetCode>,
    ) -> Self {
        let memberships = memberships
            .into_iter()
            .map(|(feature, names)| {
                let keys = names.iter().map(|n| station::join_key(n)).collect();
                (feature, keys)
            })
            .collect();
        Self {
            memberships,
            targets,
        }
    }

    /// Built-in table for Seoul subway lines 1-4
    pub fn seoul_lines_1_to_4() -> Self {
        fn names(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }

        let memberships = BTreeMap::from([
            (
                Feature::Terminal,
                // Rail (KTX) and intercity bus terminals
                names(&[
                    "서울역", "용산", "청량리", "영등포", "수서", "광명", "강변", "고속터미널",
                    "남부터미널", "상봉",
                ]),
            ),
            (
                Feature::TransferHub,
                names(&[
                    "서울역", "시청", "종로3가", "동대문", "동대문역사문화공원", "충무로", "신도림",
                    "사당", "교대", "강남", "고속터미널", "노원", "창동", "이수", "삼각지", "동작",
                    "금정", "오이도", "가산디지털단지",
                ]),
            ),
            (
                Feature::University,
                names(&[
                    "혜화", "성신여대입구", "한성대입구", "신촌", "이대", "홍대입구", "건대입구",
                    "동대입구", "충무로", "숙대입구", "한양대", "고려대", "안암", "회기", "외대앞",
                    "서울대입구", "광운대", "미아사거리",
                ]),
            ),
            (
                Feature::Office,
                names(&[
                    "종각", "광화문", "을지로입구", "을지로3가", "역삼", "선릉", "삼성", "서초",
                    "구로디지털단지", "양재", "남영", "용산", "여의도", "시청",
                ]),
            ),
            (
                Feature::Academy,
                names(&["노량진", "대치", "노원", "목동", "중계", "교대"]),
            ),
            (
                Feature::School,
                names(&[
                    "한성대입구", "미아", "길음", "상계", "명일", "한티", "도곡", "방배", "서초",
                    "안국",
                ]),
            ),
            (
                Feature::NightlifeHub,
                names(&[
                    "성수", "홍대입구", "이태원", "을지로3가", "종로3가", "신용산", "삼각지", "혜화",
                    "합정", "상수", "망원", "압구정", "신사",
                ]),
            ),
        ]);

        let targets = BTreeMap::from([
            (Feature::Terminal, TargetCode::Traveler),
            (Feature::TransferHub, TargetCode::Transfer),
            (Feature::University, TargetCode::UnivStudent),
            (Feature::School, TargetCode::TeenStudent),
            (Feature::Academy, TargetCode::TeenStudent),
            (Feature::Office, TargetCode::Office),
            (Feature::NightlifeHub, TargetCode::Hotplace),
        ]);

        Self::new(memberships, targets)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CategoryTableFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid category table: {}", e)))?;

        let invalid = |e: Error| Error::Config(format!("Invalid category table: {}", e));
        let mut memberships = BTreeMap::new();
        for (name, stations) in file.categories {
            memberships.insert(name.parse::<Feature>().map_err(invalid)?, stations);
        }
        let mut targets = BTreeMap::new();
        for (feature, code) in file.targets {
            targets.insert(
                feature.parse::<Feature>().map_err(invalid)?,
                code.parse::<TargetCode>().map_err(invalid)?,
            );
        }
        Ok(Self::new(memberships, targets))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Categories containing the station (by join key)
    pub fn features_of(&self, station_name: &str) -> BTreeSet<Feature> {
        let key = station::join_key(station_name);
        self.memberships
            .iter()
            .filter(|(_, members)| members.contains(&key))
            .map(|(feature, _)| *feature)
            .collect()
    }

    pub fn target_of(&self, feature: Feature) -> Option<TargetCode> {
        self.targets.get(&feature).copied()
    }
}

/// Multi-target classifier over a [`CategoryTable`]
#[derive(Debug, Clone)]
pub struct StaticClassifier {
    table: Arc<CategoryTable>,
}

impl StaticClassifier {
    pub fn new(table: Arc<CategoryTable>) -> Self {
        Self { table }
    }
}

impl Classifier for StaticClassifier {
    fn classify(&self, station_name: &str) -> StationProfile {
        let feature_tags = self.table.features_of(station_name);
        let target_tags: BTreeSet<TargetCode> = feature_tags
            .iter()
            .filter_map(|feature| self.table.target_of(*feature))
            .collect();

        debug!(
            station = station_name,
            features = feature_tags.len(),
            targets = target_tags.len(),
            "Classified station from category tables"
        );

        StationProfile::new(station_name, feature_tags, target_tags)
    }
}
