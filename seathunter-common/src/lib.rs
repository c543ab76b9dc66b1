//! # Seat Hunter Common Library
//!
//! Shared code for the Seat Hunter ETL jobs and presentation API:
//! - Station names, feature categories and demographic target codes
//! - Station feature classification (static tables or place search)
//! - Car-position scoring engine
//! - Historical aggregation and real-time congestion reconciliation
//! - Report formatting
//! - Configuration loading and the SQLite store

pub mod classifier;
pub mod config;
pub mod coordinates;
pub mod db;
pub mod error;
pub mod history;
pub mod presenter;
pub mod realtime;
pub mod reconcile;
pub mod scoring;
pub mod station;
pub mod tags;

pub use classifier::{Classifier, ProfileDirectory, StationProfile};
pub use error::{Error, Result};
pub use history::{Direction, HistoricalAggregate, HistoricalIndex};
pub use realtime::RealtimeObservation;
pub use reconcile::{reconcile, CongestionReportRow, RiskLevel};
pub use scoring::{Recommendation, ScoringEngine};
pub use tags::{Feature, TargetCode};
