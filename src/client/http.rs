//! HTTP Client
//!
//! Blocking Gemini `generateContent` transport. One [`GeminiTransport`] is
//! bound to one API key; [`GeminiConnector`] hands out a new one per key.

use crate::api::{ErrorEnvelope, GenerateContentRequest, GenerateContentResponse};
use crate::client::transport::{Connector, Transport};
use crate::config::GeminiSettings;
use crate::error::{RelayError, RemoteError, Result};
use crate::router::Credential;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use std::time::Duration;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Builds credential-bound transports that share one connection pool
#[derive(Debug, Clone)]
pub struct GeminiConnector {
    client: Client,
    base_url: String,
}

impl GeminiConnector {
    /// Create a connector from transport settings
    pub fn new(settings: &GeminiSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| RelayError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl Connector for GeminiConnector {
    type Transport = GeminiTransport;

    fn connect(&self, credential: &Credential) -> GeminiTransport {
        GeminiTransport {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            credential: credential.clone(),
        }
    }
}

/// Gemini transport bound to a single API key
#[derive(Debug)]
pub struct GeminiTransport {
    client: Client,
    base_url: String,
    credential: Credential,
}

impl GeminiTransport {
    fn headers(&self) -> std::result::Result<HeaderMap, RemoteError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut key = HeaderValue::from_str(self.credential.value()).map_err(|e| {
            RemoteError::new(
                None,
                Some("API_KEY_INVALID".to_string()),
                format!("Invalid API key format: {}", e),
            )
        })?;
        key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key);

        Ok(headers)
    }
}

impl Transport for GeminiTransport {
    type Request = GenerateContentRequest;
    type Response = GenerateContentResponse;

    fn call(
        &mut self,
        target: &str,
        request: &GenerateContentRequest,
    ) -> std::result::Result<GenerateContentResponse, RemoteError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, target);

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(request)
            .send()?;

        let status = response.status();
        let body = response.text()?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| {
                RemoteError::unstructured(format!(
                    "Failed to parse response: {}. Body: {}",
                    e,
                    truncate(&body, 500)
                ))
            });
        }

        Err(error_from_body(status.as_u16(), &body))
    }
}

/// Build a [`RemoteError`] from a non-2xx response body
fn error_from_body(status: u16, body: &str) -> RemoteError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => RemoteError::new(
            Some(envelope.error.code.unwrap_or(status)),
            envelope.error.machine_code(),
            envelope.error.message,
        ),
        Err(_) => RemoteError::new(Some(status), None, truncate(body, 500)),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
