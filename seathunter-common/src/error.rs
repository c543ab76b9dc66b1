//! Common error types for Seat Hunter

use thiserror::Error;

/// Common result type for Seat Hunter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Seat Hunter crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited file read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested station or data not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Structurally invalid input (fatal to the batch)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A single value could not be parsed; callers usually drop the record
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
