//! OpenAI-compatible `/chat/completions` implementation of [`TextGenerator`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use lessonforge_shared::{LessonForgeError, LlmConfig, Result, resolve_secret};

use crate::TextGenerator;

/// User-Agent string for generative-service requests.
const USER_AGENT: &str = concat!("LessonForge/", env!("CARGO_PKG_VERSION"));

/// Transport-level timeout; the synthesizer applies its own timeout on top.
const DEFAULT_TIMEOUT_SECS: u64 = 600;

// ---------------------------------------------------------------------------
// Protocol types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

// ---------------------------------------------------------------------------
// ChatCompletionsClient
// ---------------------------------------------------------------------------

/// Client for an OpenAI-compatible chat completions API.
pub struct ChatCompletionsClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl ChatCompletionsClient {
    /// Create a client against `api_base` (e.g. `https://api.openai.com/v1`).
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| LessonForgeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.7,
        })
    }

    /// Build a client from the `[llm]` config section.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let key = resolve_secret(&config.api_key_env, "LLM API key")?;
        let mut client = Self::new(&config.api_base, key, &config.model)?;
        client.temperature = config.temperature;
        Ok(client)
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsClient {
    #[instrument(skip_all, fields(model = %self.model, input_chars = user_text.chars().count()))]
    async fn complete(&self, system_instruction: &str, user_text: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_instruction,
                },
                ChatMessage {
                    role: "user",
                    content: user_text,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LessonForgeError::SynthesisFailed(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(LessonForgeError::SynthesisFailed(format!(
                "HTTP {status}: {snippet}"
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            LessonForgeError::SynthesisFailed(format!("invalid response body: {e}"))
        })?;

        if let Some(usage) = &parsed.usage {
            info!(
                tokens_in = usage.prompt_tokens,
                tokens_out = usage.completion_tokens,
                "completion received"
            );
        }

        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            LessonForgeError::SynthesisFailed("response contained no choices".into())
        })?;

        Ok(choice.message.content.unwrap_or_default())
    }
}
