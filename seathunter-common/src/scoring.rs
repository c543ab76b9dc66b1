//! Car-position scoring engine
//!
//! Every car of a 10-car train starts at a baseline score. Each target code
//! at the station applies its rule (bonus on favored cars, penalty on
//! disfavored cars), then the expected alighting volume lifts all cars
//! uniformly. The best car is the highest score, ties going to the lowest
//! position.

use crate::classifier::{ProfileDirectory, StationProfile};
use crate::tags::TargetCode;
use crate::Result;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Number of car positions on a train
pub const CAR_COUNT: usize = 10;

/// Starting score of every car
pub const BASELINE_SCORE: i32 = 50;

/// Added per favored car
pub const FAVORED_BONUS: i32 = 15;

/// Subtracted per disfavored car
pub const DISFAVORED_PENALTY: i32 = 20;

/// Volume above which every car gets [`HEAVY_VOLUME_BONUS`]
pub const HEAVY_VOLUME_THRESHOLD: u64 = 3000;
pub const HEAVY_VOLUME_BONUS: i32 = 20;

/// Volume above which every car gets [`MODERATE_VOLUME_BONUS`]
pub const MODERATE_VOLUME_THRESHOLD: u64 = 1000;
pub const MODERATE_VOLUME_BONUS: i32 = 10;

/// Scores for car positions 1..=10
///
/// Backed by a fixed array, so every position is always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarScoreBoard {
    scores: [i32; CAR_COUNT],
}

impl Default for CarScoreBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl CarScoreBoard {
    pub fn new() -> Self {
        Self {
            scores: [BASELINE_SCORE; CAR_COUNT],
        }
    }

    fn index(position: u8) -> Option<usize> {
        let position = position as usize;
        (1..=CAR_COUNT).contains(&position).then(|| position - 1)
    }

    pub fn get(&self, position: u8) -> Option<i32> {
        Self::index(position).map(|i| self.scores[i])
    }

    /// Add `delta` to one car; returns false for a position outside 1..=10
    pub fn adjust(&mut self, position: u8, delta: i32) -> bool {
        match Self::index(position) {
            Some(i) => {
                self.scores[i] += delta;
                true
            }
            None => false,
        }
    }

    pub fn shift_all(&mut self, delta: i32) {
        for score in self.scores.iter_mut() {
            *score += delta;
        }
    }

    /// (position, score) pairs in position order
    pub fn iter(&self) -> impl Iterator<Item = (u8, i32)> + '_ {
        self.scores
            .iter()
            .enumerate()
            .map(|(i, score)| (i as u8 + 1, *score))
    }

    /// Highest-scoring position; the first maximum in position order wins
    pub fn best(&self) -> (u8, i32) {
        self.iter()
            .fold((1, self.scores[0]), |(best_pos, best_score), (pos, score)| {
                if score > best_score {
                    (pos, score)
                } else {
                    (best_pos, best_score)
                }
            })
    }
}

impl Serialize for CarScoreBoard {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(CAR_COUNT))?;
        for (position, score) in self.iter() {
            map.serialize_entry(&position, &score)?;
        }
        map.end()
    }
}

/// Scoring rule for one target code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetRule {
    pub target_code: TargetCode,
    pub favored_positions: Vec<u8>,
    pub disfavored_positions: Vec<u8>,
    pub rationale_message: String,
}

impl TargetRule {
    pub fn favoring(target_code: TargetCode, positions: &[u8], message: &str) -> Self {
        Self {
            target_code,
            favored_positions: positions.to_vec(),
            disfavored_positions: Vec::new(),
            rationale_message: message.to_string(),
        }
    }

    pub fn avoiding(target_code: TargetCode, positions: &[u8], message: &str) -> Self {
        Self {
            target_code,
            favored_positions: Vec::new(),
            disfavored_positions: positions.to_vec(),
            rationale_message: message.to_string(),
        }
    }
}

/// Rules keyed by target code
#[derive(Debug, Clone, Default)]
pub struct RuleBook {
    rules: BTreeMap<TargetCode, TargetRule>,
}

impl RuleBook {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in seating rules; Senior and General have none
    pub fn seat_strategy() -> Self {
        let mut book = Self::empty();
        book.insert(TargetCode::Traveler.avoid(
            &[1, 10],
            "🧳 짐이 많은 여행객/터미널 이용객이 많습니다. 회전율이 낮으니 피하세요!",
        ));
        book.insert(TargetCode::Transfer.favor(
            &[1, 4, 7, 10],
            "🏃 환승객이 대거 하차하는 역입니다. 환승 계단 근처 칸을 노리세요!",
        ));
        book.insert(TargetCode::UnivStudent.favor(
            &[3, 5, 8],
            "🎓 대학생들이 수업 들으러 많이 내립니다. 책가방 멘 학생 앞을 노리세요.",
        ));
        book.insert(TargetCode::TeenStudent.favor(
            &[2, 9],
            "🏫 학원/학교 가는 학생들이 내립니다.",
        ));
        book.insert(TargetCode::Office.favor(
            &[2, 3, 8, 9],
            "💼 직장인들이 출근하러 내립니다. 문 근처에 서보세요.",
        ));
        book.insert(TargetCode::Hotplace.favor(
            &[5, 6],
            "✨ 약속 장소로 가는 사람들이 내립니다.",
        ));
        book
    }

    /// Replaces any existing rule for the same code
    pub fn insert(&mut self, rule: TargetRule) {
        self.rules.insert(rule.target_code, rule);
    }

    pub fn get(&self, code: TargetCode) -> Option<&TargetRule> {
        self.rules.get(&code)
    }
}

impl TargetCode {
    fn favor(self, positions: &[u8], message: &str) -> TargetRule {
        TargetRule::favoring(self, positions, message)
    }

    fn avoid(self, positions: &[u8], message: &str) -> TargetRule {
        TargetRule::avoiding(self, positions, message)
    }
}

/// Uniform bonus for the expected alighting volume
pub fn volume_bonus(off_board_volume: u64) -> i32 {
    if off_board_volume > HEAVY_VOLUME_THRESHOLD {
        HEAVY_VOLUME_BONUS
    } else if off_board_volume > MODERATE_VOLUME_THRESHOLD {
        MODERATE_VOLUME_BONUS
    } else {
        0
    }
}

/// Scoring outcome for one station
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub station_name: String,
    pub feature_list: String,
    pub target_tags: Vec<TargetCode>,
    pub off_board_volume: u64,
    pub best_car: u8,
    pub score: i32,
    /// Deduplicated rule messages, in first-fired order
    pub rationale: Vec<String>,
    pub per_car_scores: CarScoreBoard,
}

/// Rule-based scoring engine
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    rules: RuleBook,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(RuleBook::seat_strategy())
    }
}

impl ScoringEngine {
    pub fn new(rules: RuleBook) -> Self {
        Self { rules }
    }

    /// Score every car for a station profile and pick the best one
    pub fn score(&self, profile: &StationProfile, off_board_volume: u64) -> Recommendation {
        let mut board = CarScoreBoard::new();
        let mut rationale: Vec<String> = Vec::new();

        for code in &profile.target_tags {
            let Some(rule) = self.rules.get(*code) else {
                debug!(station = %profile.station_name, code = %code, "No rule for target, skipping");
                continue;
            };

            for position in &rule.favored_positions {
                self.apply(&mut board, rule, *position, FAVORED_BONUS);
            }
            for position in &rule.disfavored_positions {
                self.apply(&mut board, rule, *position, -DISFAVORED_PENALTY);
            }

            let fired = !rule.favored_positions.is_empty() || !rule.disfavored_positions.is_empty();
            if fired && !rationale.contains(&rule.rationale_message) {
                rationale.push(rule.rationale_message.clone());
            }
        }

        board.shift_all(volume_bonus(off_board_volume));
        let (best_car, score) = board.best();

        Recommendation {
            station_name: profile.station_name.clone(),
            feature_list: profile.feature_list(),
            target_tags: profile.target_tags.iter().copied().collect(),
            off_board_volume,
            best_car,
            score,
            rationale,
            per_car_scores: board,
        }
    }

    /// Look the station up, then score it; unknown stations are NotFound
    pub fn recommend(
        &self,
        directory: &ProfileDirectory,
        station_name: &str,
        off_board_volume: u64,
    ) -> Result<Recommendation> {
        let profile = directory.require(station_name)?;
        Ok(self.score(profile, off_board_volume))
    }

    fn apply(&self, board: &mut CarScoreBoard, rule: &TargetRule, position: u8, delta: i32) {
        if !board.adjust(position, delta) {
            warn!(
                code = %rule.target_code,
                position,
                "Rule names a car outside 1..={}, ignoring",
                CAR_COUNT
            );
        }
    }
}
