//! Common error types for NRP

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for NRP bootstrap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while bootstrapping an NRP service (configuration, database setup)
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML config file exists but could not be parsed
    #[error("Failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
