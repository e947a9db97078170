//! Error types for kmsbridge.
//!
//! Startup errors (configuration, certificate material) and per-call errors
//! (backend, encoding, deadline) share one enum. The RPC layer decides which
//! of them end the process and which become a single failed call.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the kmsbridge core.
#[derive(Debug, Error)]
pub enum KmsError {
    // Configuration errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // TLS material errors
    #[error("TLS error: {message}")]
    Tls { message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Encoding error: {message}")]
    Encoding { message: String },

    // Backend errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Backend returned HTTP {status} for {operation}")]
    BackendStatus { operation: String, status: u16 },

    #[error("Malformed backend response for {operation}: {message}")]
    MalformedResponse { operation: String, message: String },

    #[error("Operation was cancelled")]
    Cancelled,
}

/// Result type alias for kmsbridge operations.
pub type Result<T> = std::result::Result<T, KmsError>;

impl From<std::io::Error> for KmsError {
    fn from(err: std::io::Error) -> Self {
        KmsError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for KmsError {
    fn from(err: serde_json::Error) -> Self {
        KmsError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<base64::DecodeError> for KmsError {
    fn from(err: base64::DecodeError) -> Self {
        KmsError::Encoding {
            message: err.to_string(),
        }
    }
}

impl KmsError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        KmsError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a validation error for a named field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        KmsError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether the failure comes from the backend being unreachable or
    /// refusing the call, as opposed to a bad request or a bad reply.
    ///
    /// The orchestrator owns retries; this only picks the status it sees.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            KmsError::Network { .. } | KmsError::Timeout(_) | KmsError::BackendStatus { .. }
        )
    }
}
