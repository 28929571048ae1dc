//! Common error types for GeoHarvest

use thiserror::Error;

/// Common result type for GeoHarvest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the GeoHarvest crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding of a stored column failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input (malformed coordinates, timestamps, etc.)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
