//! End-to-end processing: folder id → access bootstrap → enumerate → extract →
//! aggregate → synthesize → normalize → chapters.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument};

use lessonforge_drive::{DriveClient, FolderStore, ensure_access, list_images, sanitize_folder_id};
use lessonforge_ocr::{ExtractionOptions, ExtractionProgress, TextDetector, VisionClient, extract_all};
use lessonforge_shared::{AppConfig, Chapter, LessonForgeError, PipelineConfig, Result};
use lessonforge_synthesis::{ChatCompletionsClient, TextGenerator, normalize, synthesize};

use crate::aggregate::aggregate;

/// Result of one pipeline run.
#[derive(Debug)]
pub struct ProcessResult {
    /// Sanitized folder id the run processed.
    pub folder_id: String,
    pub chapters: Vec<Chapter>,
    /// Number of image files enumerated.
    pub file_count: usize,
    /// Files that contributed no text (failed or blank).
    pub empty_files: usize,
    /// Characters in the aggregated corpus.
    pub corpus_chars: usize,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each file finishes extraction, in completion order.
    fn file_extracted(&self, name: &str, chars: usize, current: usize, total: usize);
    /// Called when the run completes successfully.
    fn done(&self, result: &ProcessResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn file_extracted(&self, _name: &str, _chars: usize, _current: usize, _total: usize) {}
    fn done(&self, _result: &ProcessResult) {}
}

/// The processing pipeline with its three external collaborators.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn FolderStore>,
    detector: Arc<dyn TextDetector>,
    generator: Arc<dyn TextGenerator>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn FolderStore>,
        detector: Arc<dyn TextDetector>,
        generator: Arc<dyn TextGenerator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            detector,
            generator,
            config,
        }
    }

    /// Build the production pipeline (Drive, Cloud Vision, chat completions).
    ///
    /// Fails with a config error when a credential env var is unset.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store = DriveClient::from_config(&config.drive)?;
        let detector = VisionClient::from_config(&config.vision)?;
        let generator = ChatCompletionsClient::from_config(&config.llm)?;
        Ok(Self::new(
            Arc::new(store),
            Arc::new(detector),
            Arc::new(generator),
            PipelineConfig::from(config),
        ))
    }

    /// Run the whole pipeline for a raw (unsanitized) folder id.
    ///
    /// Stages run strictly in sequence; only extraction fans out. Per-file
    /// failures degrade to empty text, a failed bootstrap is logged and
    /// ignored, and a malformed synthesis reply yields zero chapters.
    #[instrument(skip_all, fields(folder_id = %raw_folder_id.trim()))]
    pub async fn run(
        &self,
        raw_folder_id: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<ProcessResult> {
        let start = Instant::now();
        let folder_id =
            sanitize_folder_id(raw_folder_id).ok_or(LessonForgeError::MissingFolderId)?;

        info!(%folder_id, "starting processing run");

        progress.phase("Granting folder access");
        ensure_access(
            self.store.as_ref(),
            &folder_id,
            self.config.service_account_email.as_deref(),
        )
        .await;

        progress.phase("Listing images");
        let files = list_images(
            self.store.as_ref(),
            &folder_id,
            &self.config.image_mime_types,
        )
        .await?;
        let file_count = files.len();

        progress.phase("Extracting text");
        let texts = extract_all(
            Arc::clone(&self.store),
            Arc::clone(&self.detector),
            files,
            &ExtractionOptions::from(&self.config),
            &ReporterAdapter(progress),
        )
        .await;
        let empty_files = texts.iter().filter(|t| t.text.is_empty()).count();

        let corpus = aggregate(&texts);
        let corpus_chars = corpus.as_str().chars().count();

        progress.phase("Synthesizing chapters");
        let reply = synthesize(
            self.generator.as_ref(),
            &corpus,
            self.config.synthesis_timeout,
        )
        .await?;

        progress.phase("Normalizing");
        let chapters = normalize(&reply);

        let result = ProcessResult {
            folder_id,
            chapters,
            file_count,
            empty_files,
            corpus_chars,
            elapsed: start.elapsed(),
        };

        info!(
            chapters = result.chapters.len(),
            file_count,
            empty_files,
            corpus_chars,
            elapsed_ms = result.elapsed.as_millis(),
            "processing run complete"
        );

        progress.done(&result);
        Ok(result)
    }

    /// Like [`run`](Self::run), but abandons the run with `Cancelled` as soon
    /// as `cancel` resolves. In-flight extraction tasks are aborted.
    pub async fn run_until<F>(
        &self,
        raw_folder_id: &str,
        progress: &dyn ProgressReporter,
        cancel: F,
    ) -> Result<ProcessResult>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            () = cancel => {
                info!("processing run cancelled");
                Err(LessonForgeError::Cancelled)
            }
            result = self.run(raw_folder_id, progress) => result,
        }
    }
}

/// Adapts a `ProgressReporter` to the `ExtractionProgress` interface.
struct ReporterAdapter<'a>(&'a dyn ProgressReporter);

impl ExtractionProgress for ReporterAdapter<'_> {
    fn file_extracted(&self, name: &str, chars: usize, current: usize, total: usize) {
        self.0.file_extracted(name, chars, current, total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::testing::{FAKE_SERVICE_IDENTITY, FakeDrive, FakeGenerator, FakeOcr};
    use lessonforge_shared::ExplanationTable;

    const PNG: &str = "image/png";
    const JPEG: &str = "image/jpeg";

    const TWO_CHAPTERS: &str = r#"[
        {"title":"Basics","content":"intro","webText":"body","questions":[
            {"question":"Q1","options":["a","b","c"],"correctAnswers":[2],
             "explanation":"because","explanationImages":[],
             "explanationTable":{"headers":["k","v"],"rows":[["x","y"]]}}
        ]},
        {"title":"Advanced","content":"more","webText":"deep","questions":[]}
    ]"#;

    fn pipeline(drive: FakeDrive, ocr: FakeOcr, generator: FakeGenerator) -> Pipeline {
        pipeline_with(Arc::new(drive), Arc::new(ocr), Arc::new(generator))
    }

    fn pipeline_with(
        drive: Arc<FakeDrive>,
        ocr: Arc<FakeOcr>,
        generator: Arc<FakeGenerator>,
    ) -> Pipeline {
        let config = PipelineConfig {
            service_account_email: Some("svc@example.iam".into()),
            ..PipelineConfig::default()
        };
        Pipeline::new(drive, ocr, generator, config)
    }

    fn three_page_drive() -> FakeDrive {
        FakeDrive::new().with_folder(
            "F",
            &[
                ("f2", "page2.png", PNG),
                ("n1", "notes.pdf", "application/pdf"),
                ("f1", "page1.jpg", JPEG),
                ("f3", "page3.png", PNG),
            ],
        )
    }

    #[derive(Default)]
    struct RecordingProgress {
        phases: Mutex<Vec<String>>,
        extracted: Mutex<usize>,
        done: Mutex<bool>,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, name: &str) {
            self.phases.lock().unwrap().push(name.to_string());
        }
        fn file_extracted(&self, _name: &str, _chars: usize, _current: usize, _total: usize) {
            *self.extracted.lock().unwrap() += 1;
        }
        fn done(&self, _result: &ProcessResult) {
            *self.done.lock().unwrap() = true;
        }
    }

    #[tokio::test]
    async fn happy_path_sends_ordered_corpus_and_returns_chapters() {
        let generator = Arc::new(FakeGenerator::replying(TWO_CHAPTERS));
        let drive = Arc::new(three_page_drive());
        let ocr = Arc::new(
            FakeOcr::new()
                .with_text("f1", "one")
                .with_text("f2", "two")
                .with_text("f3", "three"),
        );
        let p = pipeline_with(Arc::clone(&drive), ocr, Arc::clone(&generator));
        let progress = RecordingProgress::default();

        let result = p.run("F", &progress).await.unwrap();

        assert_eq!(generator.prompts(), vec!["one\n\ntwo\n\nthree".to_string()]);
        assert_eq!(result.folder_id, "F");
        assert_eq!(result.file_count, 3);
        assert_eq!(result.empty_files, 0);
        assert_eq!(result.chapters.len(), 2);
        assert_eq!(result.chapters[0].title, "Basics");
        assert_eq!(result.chapters[0].questions[0].correct_answers, vec![2]);
        assert!(result.chapters[1].questions.is_empty());

        assert!(drive.calls().contains(&"grant:F:svc@example.iam".to_string()));
        assert!(!drive.calls().contains(&"download:n1".to_string()));
        assert_eq!(*progress.extracted.lock().unwrap(), 3);
        assert!(*progress.done.lock().unwrap());
        assert_eq!(progress.phases.lock().unwrap().first().unwrap(), "Granting folder access");
    }

    #[tokio::test]
    async fn failed_file_leaves_empty_slot() {
        let generator = Arc::new(FakeGenerator::replying("[]"));
        let ocr = FakeOcr::new()
            .with_text("f1", "one")
            .failing_on("f2")
            .with_text("f3", "three");
        let p = pipeline_with(Arc::new(three_page_drive()), Arc::new(ocr), Arc::clone(&generator));

        let result = p.run("F", &SilentProgress).await.unwrap();

        assert_eq!(generator.prompts(), vec!["one\n\n\n\nthree".to_string()]);
        assert_eq!(result.empty_files, 1);
        assert!(result.chapters.is_empty());
    }

    #[tokio::test]
    async fn non_json_reply_yields_no_chapters() {
        let p = pipeline(
            three_page_drive(),
            FakeOcr::new().with_text("f1", "one"),
            FakeGenerator::replying("Sorry, I can't help with that."),
        );
        let result = p.run("F", &SilentProgress).await.unwrap();
        assert!(result.chapters.is_empty());
    }

    #[tokio::test]
    async fn partial_chapter_gets_defaults() {
        let p = pipeline(
            three_page_drive(),
            FakeOcr::new(),
            FakeGenerator::replying(r#"[{"title":"Only title","questions":[{"question":"Q"}]}]"#),
        );
        let result = p.run("F", &SilentProgress).await.unwrap();

        let chapter = &result.chapters[0];
        assert_eq!(chapter.title, "Only title");
        assert_eq!(chapter.content, "");
        assert_eq!(chapter.web_text, "");
        let q = &chapter.questions[0];
        assert!(q.options.is_empty());
        assert!(q.correct_answers.is_empty());
        assert_eq!(q.explanation_table.headers, ExplanationTable::default_headers());
    }

    #[tokio::test]
    async fn folder_id_is_sanitized_before_use() {
        let drive = Arc::new(three_page_drive());
        let p = pipeline_with(
            Arc::clone(&drive),
            Arc::new(FakeOcr::new()),
            Arc::new(FakeGenerator::replying("[]")),
        );
        let result = p.run("  F/ \n", &SilentProgress).await.unwrap();
        assert_eq!(result.folder_id, "F");
        assert!(drive.calls().contains(&"metadata:F".to_string()));
    }

    #[tokio::test]
    async fn missing_folder_id_fails_before_any_call() {
        let drive = Arc::new(three_page_drive());
        let p = pipeline_with(
            Arc::clone(&drive),
            Arc::new(FakeOcr::new()),
            Arc::new(FakeGenerator::replying("[]")),
        );
        let err = p.run("   ", &SilentProgress).await.unwrap_err();
        assert!(matches!(err, LessonForgeError::MissingFolderId));
        assert!(drive.calls().is_empty());
    }

    #[tokio::test]
    async fn file_id_is_not_a_folder() {
        let generator = Arc::new(FakeGenerator::replying("[]"));
        let drive = three_page_drive().with_file("doc", "doc.png", PNG);
        let p = pipeline_with(Arc::new(drive), Arc::new(FakeOcr::new()), Arc::clone(&generator));

        let err = p.run("doc", &SilentProgress).await.unwrap_err();
        assert!(matches!(err, LessonForgeError::NotAFolder { .. }));
        assert!(generator.prompts().is_empty());
    }

    #[tokio::test]
    async fn unknown_folder_is_not_found() {
        let p = pipeline(
            three_page_drive(),
            FakeOcr::new(),
            FakeGenerator::replying("[]"),
        );
        let err = p.run("missing", &SilentProgress).await.unwrap_err();
        assert!(matches!(err, LessonForgeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn folder_without_images_skips_synthesis() {
        let generator = Arc::new(FakeGenerator::replying("[]"));
        let ocr = Arc::new(FakeOcr::new());
        let drive = FakeDrive::new().with_folder("E", &[("d", "readme.txt", "text/plain")]);
        let p = pipeline_with(Arc::new(drive), Arc::clone(&ocr), Arc::clone(&generator));

        let err = p.run("E", &SilentProgress).await.unwrap_err();
        assert!(matches!(err, LessonForgeError::NoImagesFound { .. }));
        assert_eq!(ocr.call_count(), 0);
        assert!(generator.prompts().is_empty());
    }

    #[tokio::test]
    async fn bootstrap_uses_store_identity_by_default() {
        let drive = Arc::new(three_page_drive());
        let p = Pipeline::new(
            Arc::clone(&drive) as Arc<dyn FolderStore>,
            Arc::new(FakeOcr::new()),
            Arc::new(FakeGenerator::replying("[]")),
            PipelineConfig::default(),
        );

        p.run("F", &SilentProgress).await.unwrap();

        let calls = drive.calls();
        let grant = format!("grant:F:{FAKE_SERVICE_IDENTITY}");
        assert_eq!(calls[..2], ["identity".to_string(), grant]);
    }

    #[tokio::test]
    async fn unknown_identity_skips_grant_but_runs() {
        let drive = Arc::new(three_page_drive().without_identity());
        let p = Pipeline::new(
            Arc::clone(&drive) as Arc<dyn FolderStore>,
            Arc::new(FakeOcr::new()),
            Arc::new(FakeGenerator::replying(TWO_CHAPTERS)),
            PipelineConfig::default(),
        );

        let result = p.run("F", &SilentProgress).await.unwrap();

        assert_eq!(result.chapters.len(), 2);
        assert!(!drive.calls().iter().any(|c| c.starts_with("grant:")));
    }

    #[tokio::test]
    async fn failed_bootstrap_does_not_stop_the_run() {
        let p = pipeline(
            three_page_drive().failing_grants(),
            FakeOcr::new().with_text("f1", "one"),
            FakeGenerator::replying(TWO_CHAPTERS),
        );
        let result = p.run("F", &SilentProgress).await.unwrap();
        assert_eq!(result.chapters.len(), 2);
    }

    #[tokio::test]
    async fn synthesis_failure_fails_the_run() {
        let p = pipeline(
            three_page_drive(),
            FakeOcr::new(),
            FakeGenerator::failing("quota exceeded"),
        );
        let err = p.run("F", &SilentProgress).await.unwrap_err();
        assert!(matches!(err, LessonForgeError::SynthesisFailed(ref m) if m.contains("quota")));
    }

    #[tokio::test]
    async fn cancellation_abandons_the_run() {
        let generator = Arc::new(FakeGenerator::replying("[]"));
        let ocr = Arc::new(FakeOcr::new().with_delay(Duration::from_millis(300)));
        let p = pipeline_with(
            Arc::new(three_page_drive()),
            Arc::clone(&ocr),
            Arc::clone(&generator),
        );

        let cancel = tokio::time::sleep(Duration::from_millis(50));
        let err = p.run_until("F", &SilentProgress, cancel).await.unwrap_err();

        assert!(matches!(err, LessonForgeError::Cancelled));
        assert_eq!(ocr.call_count(), 3, "all files were in flight");

        // Aborted tasks never get past the OCR delay.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(ocr.completed_count(), 0);
        assert!(generator.prompts().is_empty());
    }

    #[tokio::test]
    async fn run_until_without_cancellation_completes() {
        let p = pipeline(
            three_page_drive(),
            FakeOcr::new(),
            FakeGenerator::replying(TWO_CHAPTERS),
        );
        let result = p
            .run_until("F", &SilentProgress, std::future::pending())
            .await
            .unwrap();
        assert_eq!(result.chapters.len(), 2);
    }
}
