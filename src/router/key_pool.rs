//! API Key Pool Management
//!
//! Holds an ordered, immutable set of credentials and a cursor that only ever
//! advances around the ring.

use crate::error::{RelayError, Result};
use std::fmt;

/// A single opaque API key
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    value: String,
}

impl Credential {
    /// Create a new credential
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Get the key value
    pub fn value(&self) -> &str {
        &self.value
    }
}

// Keys must never end up in logs or panic messages.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Ordered pool of credentials bound to one target model
#[derive(Debug)]
pub struct CredentialPool {
    /// Model name every request is sent to, whichever key is active
    target: String,

    /// Keys in configuration order, never mutated after construction
    credentials: Vec<Credential>,

    /// Index of the active key, always in `[0, credentials.len())`
    cursor: usize,
}

impl CredentialPool {
    /// Create a new pool. Fails when `keys` is empty.
    pub fn new(target: impl Into<String>, keys: Vec<String>) -> Result<Self> {
        if keys.is_empty() {
            return Err(RelayError::NoCredentials);
        }

        Ok(Self {
            target: target.into(),
            credentials: keys.into_iter().map(Credential::new).collect(),
            cursor: 0,
        })
    }

    /// Get the target identifier (model name)
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Get the number of keys in the pool
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Always false: construction rejects empty pools
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Index of the active key
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// 1-based position of the active key, used in diagnostics instead of the key itself
    pub fn position(&self) -> usize {
        self.cursor + 1
    }

    /// The active key
    pub fn current(&self) -> &Credential {
        &self.credentials[self.cursor]
    }

    /// Advance the cursor to the next key (wrapping) and return the new active key
    pub fn advance(&mut self) -> &Credential {
        self.cursor = (self.cursor + 1) % self.credentials.len();
        self.current()
    }
}
