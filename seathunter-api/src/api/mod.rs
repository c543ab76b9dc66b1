//! HTTP API handlers for seathunter-api

pub mod congestion;
pub mod health;
pub mod stations;

pub use congestion::congestion_routes;
pub use health::health_routes;
pub use stations::station_routes;
