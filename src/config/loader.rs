//! Configuration Loader
//!
//! Builds an [`ExtractorConfig`] from defaults, JSON files and environment variables.

use crate::config::settings::ExtractorConfig;
use crate::error::{RelayError, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Comma-separated list of API keys; replaces `dispatch.api_keys`
pub const API_KEYS_ENV: &str = "GEMINI_API_KEYS";

/// Overrides `dispatch.model`
pub const MODEL_ENV: &str = "GEMINI_MODEL";

/// Path of an extra config file, applied after the default locations
pub const CONFIG_PATH_ENV: &str = "KEYRELAY_CONFIG";

/// Configuration loader with support for multiple sources
pub struct ConfigLoader {
    /// Accumulated JSON, later sources override earlier ones key by key
    merged: Value,

    /// Files merged so far, in load order
    sources: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader and load from default locations
    pub fn new() -> Result<Self> {
        let mut loader = Self::with_defaults()?;

        for path in Self::get_config_paths() {
            if path.exists() {
                loader.load_from_file(&path)?;
            }
        }

        Ok(loader)
    }

    /// Create a loader with a specific config file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut loader = Self::with_defaults()?;
        loader.load_from_file(path)?;
        Ok(loader)
    }

    fn with_defaults() -> Result<Self> {
        Ok(Self {
            merged: serde_json::to_value(ExtractorConfig::default())?,
            sources: Vec::new(),
        })
    }

    /// Config files that were found and merged. Loading usually happens before
    /// logging is set up, so callers report these afterwards.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Get list of config paths to check, lowest precedence first
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // 1. User config directory
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("keyrelay").join("config.json"));
        }

        // 2. Current directory
        paths.push(PathBuf::from("keyrelay.json"));

        // 3. Environment variable
        if let Ok(custom_path) = std::env::var(CONFIG_PATH_ENV) {
            paths.push(PathBuf::from(custom_path));
        }

        paths
    }

    /// Load configuration from a specific file
    fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let overlay: Value = serde_json::from_str(&content).map_err(|e| {
            RelayError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        merge_json(&mut self.merged, overlay);
        self.sources.push(path.to_path_buf());
        Ok(())
    }

    /// Take ownership of the configuration, with environment overrides applied
    pub fn into_config(self) -> Result<ExtractorConfig> {
        let mut config: ExtractorConfig = serde_json::from_value(self.merged)
            .map_err(|e| RelayError::Config(format!("Invalid configuration: {}", e)))?;

        apply_env_overrides(&mut config, |name| std::env::var(name).ok());
        Ok(config)
    }
}

/// Recursively merge `overlay` into `base`. Objects merge key by key; any other
/// value replaces what was there.
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn apply_env_overrides(config: &mut ExtractorConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(keys) = lookup(API_KEYS_ENV) {
        let keys: Vec<String> = keys
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect();
        if !keys.is_empty() {
            config.dispatch.api_keys = keys;
        }
    }

    if let Some(model) = lookup(MODEL_ENV) {
        if !model.trim().is_empty() {
            config.dispatch.model = model.trim().to_string();
        }
    }
}
