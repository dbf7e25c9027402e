//! Failure Classification
//!
//! Maps upstream error shapes onto a small closed taxonomy that drives the
//! dispatcher's retry and rotation decisions.

use crate::error::RemoteError;
use std::fmt;

/// Machine codes that mean the key is out of quota or throttled
const RATE_LIMIT_CODES: &[&str] = &["RESOURCE_EXHAUSTED", "RATE_LIMIT_EXCEEDED"];

/// Machine codes that mean the key itself is unusable
const INVALID_CREDENTIAL_CODES: &[&str] = &[
    "API_KEY_INVALID",
    "API_KEY_EXPIRED",
    "UNAUTHENTICATED",
    "PERMISSION_DENIED",
];

/// Kind of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Rate limit or exhausted quota on the active key. Rotate immediately.
    RateLimit,

    /// The active key is invalid or expired. Rotate immediately.
    InvalidCredential,

    /// Anything else. Retry on the same key with backoff.
    Transient,
}

impl FailureKind {
    /// Whether this failure is tied to the key rather than the request
    pub fn is_credential_scoped(self) -> bool {
        !matches!(self, FailureKind::Transient)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::RateLimit => f.write_str("rate limit"),
            FailureKind::InvalidCredential => f.write_str("invalid API key"),
            FailureKind::Transient => f.write_str("transient error"),
        }
    }
}

/// Classify a failed attempt.
///
/// Rate limits take precedence over invalid keys. Raw substring matching on the
/// message is only used when the error carries neither a status nor a code.
pub fn classify(err: &RemoteError) -> FailureKind {
    if is_rate_limit(err) {
        FailureKind::RateLimit
    } else if is_invalid_credential(err) {
        FailureKind::InvalidCredential
    } else {
        FailureKind::Transient
    }
}

fn is_rate_limit(err: &RemoteError) -> bool {
    if err.status == Some(429) || code_in(err, RATE_LIMIT_CODES) {
        return true;
    }

    if err.message.to_lowercase().contains("quota") {
        return true;
    }

    err.is_unstructured()
        && (err.message.contains("429") || err.message.contains("RESOURCE_EXHAUSTED"))
}

fn is_invalid_credential(err: &RemoteError) -> bool {
    if matches!(err.status, Some(400) | Some(401) | Some(403))
        || code_in(err, INVALID_CREDENTIAL_CODES)
    {
        return true;
    }

    err.is_unstructured()
        && (err.message.contains("API_KEY_INVALID") || err.message.contains("400"))
}

fn code_in(err: &RemoteError, codes: &[&str]) -> bool {
    err.code
        .as_deref()
        .is_some_and(|code| codes.iter().any(|c| c.eq_ignore_ascii_case(code)))
}
