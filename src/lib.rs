//! Keyrelay - credential-rotating request dispatch for vision LLM APIs
//!
//! The [`router::Dispatcher`] executes one request at a time against a pool of
//! API keys, retrying transient failures with exponential backoff and rotating
//! to the next key on rate limits or invalid keys. [`ContactExtractor`] builds
//! on it to pull contact lists out of screenshots with Gemini.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::path::{Path, PathBuf};
use tracing::info;

pub mod api;
pub mod client;
pub mod config;
pub mod contacts;
pub mod error;
pub mod router;

use api::{GenerateContentRequest, GenerateContentResponse, Part};
use client::{Connector, GeminiConnector, Transport};
use config::ExtractorConfig;
use error::{RelayError, Result};
use router::{CredentialPool, Dispatcher, Sleeper, ThreadSleeper};

/// Default instruction sent with every frame
pub const DEFAULT_PROMPT: &str = r#"This is a screenshot from a WhatsApp contact selection screen.
Each row represents a contact with:
- A circular profile picture/avatar on the left
- The contact name or phone number displayed next to it
- Some contacts show a saved name (like "Tanmay Jain" or "~ Aayu$hhh_16")
- Unsaved contacts show only their phone number in format "+91 XXXXX XXXXX"

Extract ALL visible contacts from this image. For each contact row, extract:
1. The name (if it's a saved contact with a name)
2. The phone number (if visible, usually in format +91 XXXXX XXXXX)

Note: A single contact may have BOTH a name and phone number visible, or just one of them.
Skip any UI elements like "You", headers, or navigation buttons.

Return the data as a JSON array with this exact format:
```json
[
  {"name": "Contact Name Here", "phone": "+91 XXXXX XXXXX"},
  {"name": null, "phone": "+91 12345 67890"},
  {"name": "Saved Contact Name", "phone": null}
]
```

Use null for missing values. Only return the JSON array, no other text."#;

/// Extracts contacts from a directory of frames, one dispatched request per frame
pub struct ContactExtractor<C: Connector = GeminiConnector, S: Sleeper = ThreadSleeper> {
    dispatcher: Dispatcher<C, S>,
    prompt: String,
}

impl ContactExtractor<GeminiConnector> {
    /// Build an extractor talking to Gemini over HTTP
    pub fn from_config(config: &ExtractorConfig) -> Result<Self> {
        config.validate()?;

        let pool = CredentialPool::new(
            config.dispatch.model.clone(),
            config.dispatch.credentials(),
        )?;
        let connector = GeminiConnector::new(&config.gemini)?;
        let dispatcher = Dispatcher::new(pool, connector, config.dispatch.retry_policy())?;

        info!(
            keys = dispatcher.pool().len(),
            model = dispatcher.pool().target(),
            "Dispatcher ready"
        );

        let prompt = config
            .pipeline
            .prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string());

        Ok(Self::new(dispatcher, prompt))
    }
}

impl<C, S> ContactExtractor<C, S>
where
    C: Connector,
    C::Transport: Transport<Request = GenerateContentRequest, Response = GenerateContentResponse>,
    S: Sleeper,
{
    /// Create an extractor around an existing dispatcher
    pub fn new(dispatcher: Dispatcher<C, S>, prompt: impl Into<String>) -> Self {
        Self {
            dispatcher,
            prompt: prompt.into(),
        }
    }

    /// Send one frame and return the model's raw text answer
    pub fn extract_frame(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let mime_type = image_mime_type(path).ok_or_else(|| {
            RelayError::Input(format!("Unsupported image type: {}", path.display()))
        })?;
        let bytes = std::fs::read(path)?;

        let request = GenerateContentRequest::user(vec![
            Part::inline_data(mime_type, BASE64.encode(bytes)),
            Part::text(self.prompt.clone()),
        ]);

        let response = self.dispatcher.execute(&request)?;
        response.text().ok_or_else(|| {
            RelayError::Response(format!("No text in response for {}", path.display()))
        })
    }

    /// Process every frame in `dir`, in name order. The first terminal failure
    /// aborts the run.
    pub fn extract_frames(&mut self, dir: impl AsRef<Path>) -> Result<Vec<String>> {
        let frames = list_frames(dir)?;
        let total = frames.len();
        let mut records = Vec::with_capacity(total);

        for (i, frame) in frames.iter().enumerate() {
            info!(frame = %frame.display(), "Processing {}/{}", i + 1, total);
            records.push(self.extract_frame(frame)?);
        }

        let stats = self.dispatcher.stats();
        info!(
            frames = total,
            attempts = stats.attempts,
            retries = stats.retries,
            rotations = stats.rotations,
            "Extraction finished"
        );

        Ok(records)
    }

    pub fn dispatcher(&self) -> &Dispatcher<C, S> {
        &self.dispatcher
    }
}

/// MIME type for a supported frame image, by extension
pub fn image_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Image files directly inside `dir`, sorted by file name
pub fn list_frames(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|e| {
        RelayError::Input(format!("Failed to read frames dir {}: {}", dir.display(), e))
    })?;

    let mut frames = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && image_mime_type(&path).is_some() {
            frames.push(path);
        }
    }
    frames.sort();

    Ok(frames)
}

/// Write raw model answers as a JSON array
pub fn save_records(records: &[String], path: impl AsRef<Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path.as_ref(), json)?;
    info!(records = records.len(), path = %path.as_ref().display(), "Saved records");
    Ok(())
}

/// Read records written by [`save_records`]
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
