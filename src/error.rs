//! Keyrelay Error Types
//!
//! Crate-wide error handling plus the structured failure reported by a remote call.

use std::fmt;
use thiserror::Error;

/// Structured failure returned by one remote call attempt.
///
/// Carries enough of the upstream error shape (HTTP-like status, machine code,
/// human message) for [`crate::router::classify`] to map it onto a
/// [`crate::router::FailureKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// HTTP-like status code, absent for network level failures
    pub status: Option<u16>,

    /// Machine-readable error code (e.g. `RESOURCE_EXHAUSTED`, `API_KEY_INVALID`)
    pub code: Option<String>,

    /// Human-readable message
    pub message: String,
}

impl RemoteError {
    /// Create an error from a structured upstream response
    pub fn new(status: Option<u16>, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// Create an error that only has a message (connection failures, decode errors, ...)
    pub fn unstructured(message: impl Into<String>) -> Self {
        Self::new(None, None, message)
    }

    /// Whether neither a status nor a machine code is available
    pub fn is_unstructured(&self) -> bool {
        self.status.is_none() && self.code.is_none()
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.code) {
            (Some(status), Some(code)) => write!(f, "{} {}: {}", status, code, self.message),
            (Some(status), None) => write!(f, "{}: {}", status, self.message),
            (None, Some(code)) => write!(f, "{}: {}", code, self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::unstructured(format!("Request timeout: {}", err))
        } else if err.is_connect() {
            RemoteError::unstructured(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            RemoteError::unstructured(format!("Failed to decode response: {}", err))
        } else {
            RemoteError::unstructured(err.to_string())
        }
    }
}

/// Main error type for keyrelay operations
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration errors (invalid JSON, missing fields, bad values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No credential was configured
    #[error("No API keys configured. Set GEMINI_API_KEYS or add `dispatch.api_keys` to keyrelay.json")]
    NoCredentials,

    /// Every credential in the pool was tried and none completed the request
    #[error("All {tried} API keys exhausted. Last error: {last_error}")]
    AllCredentialsExhausted {
        tried: usize,
        last_error: RemoteError,
    },

    /// Building or sending a request failed outside of the dispatch loop
    #[error("Request failed: {0}")]
    Request(String),

    /// Pipeline input that cannot be processed (unsupported frame, missing directory)
    #[error("Invalid input: {0}")]
    Input(String),

    /// A successful response did not contain what the caller needed
    #[error("Response error: {0}")]
    Response(String),

    /// Filesystem errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for keyrelay operations
pub type Result<T> = std::result::Result<T, RelayError>;
