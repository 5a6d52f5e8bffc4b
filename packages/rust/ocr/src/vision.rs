//! Cloud Vision REST implementation of [`TextDetector`].

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use lessonforge_shared::{LessonForgeError, Result, VisionConfig, resolve_secret};

use crate::TextDetector;

/// User-Agent string for OCR requests.
const USER_AGENT: &str = concat!("LessonForge/", env!("CARGO_PKG_VERSION"));

/// Transport-level timeout; the pipeline applies its own per-call timeout on top.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

// ---------------------------------------------------------------------------
// Response types (subset of the images:annotate schema)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BatchAnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    full_text_annotation: Option<FullTextAnnotation>,
    #[serde(default)]
    text_annotations: Vec<EntityAnnotation>,
    #[serde(default)]
    error: Option<StatusMessage>,
}

#[derive(Debug, Deserialize)]
struct FullTextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct EntityAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct StatusMessage {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

impl AnnotateImageResponse {
    /// The full text, preferring the page-level annotation over the first entity.
    fn into_text(self) -> String {
        match self.full_text_annotation {
            Some(full) if !full.text.is_empty() => full.text,
            _ => self
                .text_annotations
                .into_iter()
                .next()
                .map(|a| a.description)
                .unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// VisionClient
// ---------------------------------------------------------------------------

/// OCR client for the Cloud Vision `images:annotate` endpoint.
pub struct VisionClient {
    client: Client,
    api_base: String,
    api_key: String,
    language_hints: Vec<String>,
}

impl VisionClient {
    /// Create a client against `api_base` (e.g. `https://vision.googleapis.com/v1`).
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| LessonForgeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            language_hints: Vec::new(),
        })
    }

    /// Build a client from the `[vision]` config section.
    pub fn from_config(config: &VisionConfig) -> Result<Self> {
        let key = resolve_secret(&config.api_key_env, "Vision API key")?;
        Ok(Self::new(&config.api_base, key)?.with_language_hints(config.language_hints.clone()))
    }

    /// Language hints forwarded to text detection.
    pub fn with_language_hints(mut self, hints: Vec<String>) -> Self {
        self.language_hints = hints;
        self
    }

    fn request_body(&self, image: &[u8]) -> serde_json::Value {
        let mut request = serde_json::json!({
            "image": { "content": STANDARD.encode(image) },
            "features": [{ "type": "TEXT_DETECTION" }],
        });
        if !self.language_hints.is_empty() {
            request["imageContext"] = serde_json::json!({ "languageHints": self.language_hints });
        }
        serde_json::json!({ "requests": [request] })
    }
}

#[async_trait]
impl TextDetector for VisionClient {
    #[instrument(skip_all, fields(bytes = image.len()))]
    async fn detect_text(&self, image: &[u8]) -> Result<String> {
        let url = format!("{}/images:annotate", self.api_base);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&self.request_body(image))
            .send()
            .await
            .map_err(|e| LessonForgeError::Network(format!("vision: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LessonForgeError::Network(format!("vision: HTTP {status}")));
        }

        let batch: BatchAnnotateResponse = response
            .json()
            .await
            .map_err(|e| LessonForgeError::Network(format!("vision: invalid body: {e}")))?;

        let Some(first) = batch.responses.into_iter().next() else {
            return Ok(String::new());
        };

        if let Some(err) = &first.error {
            if err.code != 0 || !err.message.is_empty() {
                return Err(LessonForgeError::Network(format!(
                    "vision: code {}: {}",
                    err.code, err.message
                )));
            }
        }

        let text = first.into_text();
        debug!(chars = text.chars().count(), "text detected");
        Ok(text)
    }
}
