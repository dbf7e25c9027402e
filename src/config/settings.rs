//! Extractor Configuration
//!
//! Defines the configuration schema for the dispatcher, the Gemini transport
//! and the contact pipeline.

use crate::error::{RelayError, Result};
use crate::router::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Credential pool and retry policy
    pub dispatch: DispatchConfig,

    /// HTTP transport settings
    pub gemini: GeminiSettings,

    /// Input/output locations for the contact pipeline
    pub pipeline: PipelineSettings,

    /// Fallback log filter when RUST_LOG is unset
    pub log_level: String,
}

/// Credential pool and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Raw API keys, tried in order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub api_keys: Vec<String>,

    /// Names of environment variables holding additional API keys
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub api_keys_env: Vec<String>,

    /// Target model
    pub model: String,

    /// Attempts per key before rotating
    pub max_retries: u32,

    /// Base of the exponential backoff
    pub backoff_base: u32,

    /// Length of one backoff time unit in milliseconds
    pub backoff_unit_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            api_keys: Vec::new(),
            api_keys_env: Vec::new(),
            model: DEFAULT_MODEL.to_string(),
            max_retries: policy.max_retries,
            backoff_base: policy.backoff_base,
            backoff_unit_ms: policy.unit.as_millis() as u64,
        }
    }
}

impl DispatchConfig {
    /// All configured keys: raw keys first, then env-provided ones, without duplicates
    pub fn credentials(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();

        let from_env = self
            .api_keys_env
            .iter()
            .filter_map(|name| std::env::var(name).ok());

        for key in self.api_keys.iter().cloned().chain(from_env) {
            let key = key.trim().to_string();
            if !key.is_empty() && !keys.contains(&key) {
                keys.push(key);
            }
        }

        keys
    }

    /// Retry policy derived from this section
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_base: self.backoff_base,
            unit: Duration::from_millis(self.backoff_unit_ms),
        }
    }
}

/// HTTP transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    /// API base URL
    pub base_url: String,

    /// Whole-request timeout in seconds
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 300,
            connect_timeout_secs: 10,
        }
    }
}

/// Input/output locations for the contact pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Directory of extracted video frames
    pub frames_dir: PathBuf,

    /// Raw model output, one entry per frame
    pub records_path: PathBuf,

    /// Final deduplicated contacts
    pub output_csv: PathBuf,

    /// Country calling code stripped from phone numbers
    pub country_code: String,

    /// Overrides the built-in extraction prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    /// Rebuild the CSV from `records_path` without calling the API
    pub skip_extract: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            frames_dir: PathBuf::from("images"),
            records_path: PathBuf::from("contacts.json"),
            output_csv: PathBuf::from("contacts.csv"),
            country_code: "+91".to_string(),
            prompt: None,
            skip_extract: false,
        }
    }
}

impl ExtractorConfig {
    /// Check values the dispatcher cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.model.trim().is_empty() {
            return Err(RelayError::Config("`dispatch.model` must not be empty".into()));
        }
        if self.dispatch.max_retries == 0 {
            return Err(RelayError::Config(
                "`dispatch.max_retries` must be at least 1".into(),
            ));
        }
        if self.dispatch.backoff_base == 0 {
            return Err(RelayError::Config(
                "`dispatch.backoff_base` must be at least 1".into(),
            ));
        }
        if self.dispatch.credentials().is_empty() {
            return Err(RelayError::NoCredentials);
        }
        Ok(())
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::default(),
            gemini: GeminiSettings::default(),
            pipeline: PipelineSettings::default(),
            log_level: "info".to_string(),
        }
    }
}
