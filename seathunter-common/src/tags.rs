//! Feature categories and demographic target codes
//!
//! Feature tags describe what surrounds a station (a bus terminal, a
//! university district). Target codes describe who predominantly alights
//! there. Both render to their English names; serialized tag lists are
//! sorted lexicographically and joined with `|`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tag list delimiter in serialized profiles
pub const TAG_DELIMITER: char = '|';

/// Category of points of interest around a station
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Feature {
    // Static category tables
    Terminal,
    TransferHub,
    University,
    Office,
    Academy,
    School,
    NightlifeHub,
    // Place-search categories
    TransferCenter,
    GeneralHospital,
    TraditionalMarket,
    DistrictOffice,
    IndustrialComplex,
    FoodStreet,
}

impl Feature {
    pub const ALL: [Feature; 13] = [
        Feature::Terminal,
        Feature::TransferHub,
        Feature::University,
        Feature::Office,
        Feature::Academy,
        Feature::School,
        Feature::NightlifeHub,
        Feature::TransferCenter,
        Feature::GeneralHospital,
        Feature::TraditionalMarket,
        Feature::DistrictOffice,
        Feature::IndustrialComplex,
        Feature::FoodStreet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Terminal => "Terminal",
            Feature::TransferHub => "TransferHub",
            Feature::University => "University",
            Feature::Office => "Office",
            Feature::Academy => "Academy",
            Feature::School => "School",
            Feature::NightlifeHub => "NightlifeHub",
            Feature::TransferCenter => "TransferCenter",
            Feature::GeneralHospital => "GeneralHospital",
            Feature::TraditionalMarket => "TraditionalMarket",
            Feature::DistrictOffice => "DistrictOffice",
            Feature::IndustrialComplex => "IndustrialComplex",
            Feature::FoodStreet => "FoodStreet",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Feature::ALL
            .iter()
            .copied()
            .find(|feature| feature.as_str() == s.trim())
            .ok_or_else(|| Error::InvalidInput(format!("Unknown feature tag: {}", s)))
    }
}

/// Demographic code describing who gets off at a station
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TargetCode {
    /// Luggage-heavy travelers (rail and bus terminals)
    Traveler,
    Transfer,
    UnivStudent,
    TeenStudent,
    Office,
    Hotplace,
    Senior,
    /// Default when no feature maps to a target
    General,
}

impl TargetCode {
    pub const ALL: [TargetCode; 8] = [
        TargetCode::Traveler,
        TargetCode::Transfer,
        TargetCode::UnivStudent,
        TargetCode::TeenStudent,
        TargetCode::Office,
        TargetCode::Hotplace,
        TargetCode::Senior,
        TargetCode::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetCode::Traveler => "Traveler",
            TargetCode::Transfer => "Transfer",
            TargetCode::UnivStudent => "UnivStudent",
            TargetCode::TeenStudent => "TeenStudent",
            TargetCode::Office => "Office",
            TargetCode::Hotplace => "Hotplace",
            TargetCode::Senior => "Senior",
            TargetCode::General => "General",
        }
    }
}

impl fmt::Display for TargetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TargetCode::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == s.trim())
            .ok_or_else(|| Error::InvalidInput(format!("Unknown target code: {}", s)))
    }
}

/// Render tags as a sorted, `|`-joined list
///
/// Sorting is by rendered name, not declaration order, so the same set always
/// yields the same bytes.
pub fn join_tags<'a, I, T>(tags: I) -> String
where
    I: IntoIterator<Item = &'a T>,
    T: fmt::Display + 'a,
{
    let mut names: Vec<String> = tags.into_iter().map(|t| t.to_string()).collect();
    names.sort();
    names.dedup();
    names.join(&TAG_DELIMITER.to_string())
}

/// Split a `|`-joined list, skipping blanks
pub fn split_tags(joined: &str) -> impl Iterator<Item = &str> {
    joined
        .split(TAG_DELIMITER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
