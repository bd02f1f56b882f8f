//! Error types for the demo server
//!
//! The metrics middleware itself never fails a request; these errors cover
//! startup (configuration, sink setup, binding) and the push exporter.

use crate::sink::SinkError;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read configuration file '{path}': {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file '{path}': {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Metrics sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("Failed to push metrics to {url}: {source}")]
    PushFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Push gateway at {url} rejected metrics with status {status}")]
    PushRejected { url: String, status: u16 },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
