//! atsync error types

use thiserror::Error;

/// atsync error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or rejected credentials. Fatal to the calling operation.
    #[error("Session error: {0}")]
    Session(String),

    /// The repository answered with an XRPC error body
    #[error("XRPC error ({status}) {error}: {message}")]
    Xrpc {
        status: u16,
        error: String,
        message: String,
    },

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Live stream transport error
    #[error("Stream error: {0}")]
    Stream(String),

    /// Discovery error
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Snapshot artifact error
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error means no usable session exists.
    pub fn is_session(&self) -> bool {
        matches!(self, Self::Session(_))
    }

    /// Whether a stale cache entry may stand in for the failed operation.
    ///
    /// Everything except session and configuration failures is treated as
    /// transient: network errors, timeouts, rate limits, missing records.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Session(_) | Self::Config(_))
    }

    /// Whether the upstream reported a missing record or collection.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Xrpc { status, error, .. } => {
                *status == 404 || error == "RecordNotFound" || error == "RepoNotFound"
            }
            _ => false,
        }
    }
}

/// Result type alias for atsync operations
pub type Result<T> = std::result::Result<T, Error>;
