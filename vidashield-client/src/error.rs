//! Error types for the client.

use crate::config::ConfigError;
use vidashield_cache::FetchError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Failed to init tracing subscriber: {0}")]
    Telemetry(String),
    #[error("{0}")]
    Usage(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
