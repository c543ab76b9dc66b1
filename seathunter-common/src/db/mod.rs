//! SQLite persistence for station profiles and historical aggregates

pub mod init;
pub mod store;

pub use init::init_database;
pub use store::*;
