//! Curriculum synthesis: generative-service client, synthesizer, and normalizer.
//!
//! The synthesizer sends the aggregated corpus to a [`TextGenerator`] together
//! with a structural instruction and returns the raw reply. The normalizer is
//! the only place that interprets that reply, turning whatever came back into
//! a fully-populated `Vec<Chapter>`.

mod client;
mod normalize;
mod synthesizer;

use async_trait::async_trait;

use lessonforge_shared::Result;

pub use client::ChatCompletionsClient;
pub use normalize::{normalize, parse_document};
pub use synthesizer::{SYSTEM_INSTRUCTION, synthesize};

/// A generative text service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Complete `user_text` under `system_instruction`, returning the raw reply text.
    async fn complete(&self, system_instruction: &str, user_text: &str) -> Result<String>;
}
