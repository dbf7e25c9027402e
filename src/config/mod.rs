//! Configuration Module
//!
//! Handles configuration loading and validation.

pub mod loader;
pub mod settings;

pub use loader::ConfigLoader;
pub use settings::{DispatchConfig, ExtractorConfig, GeminiSettings, PipelineSettings};
