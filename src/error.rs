//! Error types shared across the crawler, extractor and storage layers.

use std::time::Duration;

use thiserror::Error;

/// Failures reported by a browser page session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timed out after {timeout:?} waiting for `{selector}`")]
    Timeout { selector: String, timeout: Duration },

    #[error("Script execution failed: {0}")]
    Script(String),

    #[error("Element operation failed: {0}")]
    Element(String),

    #[error("Browser session lost: {0}")]
    Disconnected(String),
}

impl SessionError {
    /// Whether the session can no longer be driven at all.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Disconnected(_))
    }
}

/// Invalid crawler or analysis configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Failures while persisting records or summaries.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
