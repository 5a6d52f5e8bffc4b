//! Curriculum synthesizer: one request per run, corpus in, raw reply out.

use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{info, instrument, warn};

use lessonforge_shared::{Corpus, LessonForgeError, Result};

use crate::TextGenerator;

/// Structural instruction sent with every corpus.
pub const SYSTEM_INSTRUCTION: &str = r#"You turn study material into a structured course.
The user message is text recognised from scanned pages, in page order, pages separated by blank lines.

Split the material into logically independent chapters ordered by learning progression.
Every chapter must contain at least one question.

Respond with a JSON array and nothing else. Each element is a chapter object:
{
  "title": string,
  "content": string,            // short summary of the chapter
  "webText": string,            // detailed lesson body
  "questions": [
    {
      "question": string,
      "options": [string],      // as many as the material supports, about 5
      "correctAnswers": [number], // 1-based indices into options
      "explanation": string,
      "explanationImages": [string],
      "explanationTable": { "headers": [string], "rows": [[string]] }
    }
  ]
}"#;

/// Send `corpus` to the generative service and return its raw reply.
///
/// Service, network, and timeout errors all surface as `SynthesisFailed`.
/// The reply is not validated here; see [`crate::normalize`].
#[instrument(skip_all, fields(corpus_len = corpus.len()))]
pub async fn synthesize(
    generator: &dyn TextGenerator,
    corpus: &Corpus,
    limit: Duration,
) -> Result<String> {
    if corpus.is_blank() {
        warn!("corpus is blank, synthesis will have nothing to work with");
    }

    let start = Instant::now();
    let reply = timeout(limit, generator.complete(SYSTEM_INSTRUCTION, corpus.as_str()))
        .await
        .map_err(|_| {
            LessonForgeError::SynthesisFailed(format!("timed out after {}s", limit.as_secs()))
        })?
        .map_err(|e| match e {
            LessonForgeError::SynthesisFailed(_) => e,
            other => LessonForgeError::SynthesisFailed(other.to_string()),
        })?;

    info!(
        reply_chars = reply.chars().count(),
        elapsed_ms = start.elapsed().as_millis(),
        "synthesis complete"
    );
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    #[derive(Default)]
    struct ScriptedGenerator {
        reply: Option<String>,
        delay: Option<Duration>,
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn complete(&self, system_instruction: &str, user_text: &str) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((system_instruction.to_string(), user_text.to_string()));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply
                .clone()
                .ok_or_else(|| LessonForgeError::Network("connection reset".into()))
        }
    }

    #[test]
    fn instruction_describes_the_contract() {
        for field in [
            "title",
            "content",
            "webText",
            "questions",
            "options",
            "correctAnswers",
            "explanationImages",
            "explanationTable",
            "1-based",
        ] {
            assert!(SYSTEM_INSTRUCTION.contains(field), "missing {field}");
        }
    }

    #[tokio::test]
    async fn sends_corpus_as_user_text() {
        let generator = ScriptedGenerator {
            reply: Some("[]".into()),
            ..Default::default()
        };
        let reply = synthesize(&generator, &Corpus::new("a\n\nb"), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(reply, "[]");
        let calls = generator.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, SYSTEM_INSTRUCTION);
        assert_eq!(calls[0].1, "a\n\nb");
    }

    #[tokio::test]
    async fn service_error_becomes_synthesis_failed() {
        let generator = ScriptedGenerator::default();
        let err = synthesize(&generator, &Corpus::new("x"), Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            LessonForgeError::SynthesisFailed(msg) => assert!(msg.contains("connection reset")),
            other => panic!("expected SynthesisFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_becomes_synthesis_failed() {
        let generator = ScriptedGenerator {
            reply: Some("[]".into()),
            delay: Some(Duration::from_millis(500)),
            ..Default::default()
        };
        let err = synthesize(&generator, &Corpus::new("x"), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, LessonForgeError::SynthesisFailed(ref m) if m.contains("timed out")));
    }
}
