//! Error types for kismet-enrich

use std::time::Duration;
use thiserror::Error;

/// Result type alias for kismet-enrich operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the application
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Capture file error: {0}")]
    Kismet(String),

    #[error("Operation failed: {0}")]
    Other(String),
}

/// Errors raised while talking to an upstream HTTP service
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Rate limit exceeded. Retry after {0:?}")]
    RateLimit(Duration),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error("Embedding backend error: {0}")]
    Embedding(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Network("Request timed out".to_string())
        } else if err.is_connect() {
            ApiError::Network("Failed to connect to API".to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Persistent vendor store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Could not determine a cache directory for the vendor store")]
    NoHome,

    #[error("Vendor store I/O error: {0}")]
    Io(String),

    #[error("Vendor store database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Vendor store still locked after {attempts} attempts")]
    Busy { attempts: u32 },
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
