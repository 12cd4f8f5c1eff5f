//! Error types for the weighted DDNS client
//!
//! This module defines all error types used throughout the crate.
//!
//! The loop treats [`Error::DetectionFailed`] and [`Error::UpsertRejected`] as
//! per-cycle outcomes. Only [`Error::Config`] is meant to end the process.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for DDNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DDNS client
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (missing or invalid parameters)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No consensus was reached on the external address
    #[error("Address detection failed: {0}")]
    DetectionFailed(String),

    /// A single address source failed to answer
    #[error("Address source {source_name} failed: {message}")]
    Source {
        /// Source name (usually its URL)
        source_name: String,
        /// Error message
        message: String,
    },

    /// The DNS provider refused the record change
    #[error("Upsert rejected by {provider}{}: {message}", code_suffix(.code))]
    UpsertRejected {
        /// Provider name
        provider: String,
        /// Machine-readable error code, if the provider supplied one
        code: Option<String>,
        /// Provider diagnostic message
        message: String,
    },

    /// An external call did not complete in time
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was being waited on
        operation: String,
        /// The bound that was exceeded
        after: Duration,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a detection failure
    pub fn detection_failed(msg: impl Into<String>) -> Self {
        Self::DetectionFailed(msg.into())
    }

    /// Create a single-source failure
    pub fn source_failed(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create an upsert rejection
    pub fn upsert_rejected(
        provider: impl Into<String>,
        code: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::UpsertRejected {
            provider: provider.into(),
            code,
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this error comes from configuration rather than runtime
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
