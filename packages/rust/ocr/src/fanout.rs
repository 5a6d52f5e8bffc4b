//! Extraction fan-out: download + OCR every source file in parallel.
//!
//! Each file is processed by its own task under a shared semaphore. A task
//! writes only its own result slot (by input index), so the output keeps the
//! input order regardless of completion order. Any failure in a single file's
//! path degrades that slot to the empty string. Tasks live in a [`JoinSet`],
//! so dropping the stage future aborts everything still in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use lessonforge_drive::FolderStore;
use lessonforge_shared::{ExtractedText, LessonForgeError, PipelineConfig, Result, SourceFile};

use crate::TextDetector;

/// Limits applied to the extraction stage.
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    /// Maximum files processed at once.
    pub concurrency: usize,
    /// Timeout for one download.
    pub download_timeout: Duration,
    /// Timeout for one OCR call.
    pub ocr_timeout: Duration,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for ExtractionOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            concurrency: config.extraction_concurrency,
            download_timeout: config.download_timeout,
            ocr_timeout: config.ocr_timeout,
        }
    }
}

/// Progress callback for the extraction stage.
pub trait ExtractionProgress: Send + Sync {
    /// Called as each file finishes, in completion order.
    fn file_extracted(&self, name: &str, chars: usize, current: usize, total: usize);
}

/// No-op extraction progress.
pub struct SilentExtractionProgress;

impl ExtractionProgress for SilentExtractionProgress {
    fn file_extracted(&self, _name: &str, _chars: usize, _current: usize, _total: usize) {}
}

/// Extract text from every file. Never fails as a whole.
///
/// The result has the same length and order as `files`; a file whose download
/// or OCR failed (error, timeout, empty result, task panic) contributes `""`.
#[instrument(skip_all, fields(files = files.len(), concurrency = opts.concurrency))]
pub async fn extract_all(
    store: Arc<dyn FolderStore>,
    detector: Arc<dyn TextDetector>,
    files: Vec<SourceFile>,
    opts: &ExtractionOptions,
    progress: &dyn ExtractionProgress,
) -> Vec<ExtractedText> {
    let total = files.len();
    let semaphore = Arc::new(Semaphore::new(opts.concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, file) in files.iter().enumerate() {
        let store = Arc::clone(&store);
        let detector = Arc::clone(&detector);
        let sem = Arc::clone(&semaphore);
        let file = file.clone();
        let opts = opts.clone();

        tasks.spawn(async move {
            let result = match sem.acquire_owned().await {
                Ok(_permit) => extract_one(store.as_ref(), detector.as_ref(), &file, &opts).await,
                Err(_) => Err(LessonForgeError::extraction(&file.id, "extraction pool closed")),
            };
            (index, result)
        });
    }

    let mut slots: Vec<String> = vec![String::new(); total];
    let mut completed = 0;
    let mut failed = 0;

    while let Some(joined) = tasks.join_next().await {
        completed += 1;
        match joined {
            Ok((index, Ok(text))) => {
                progress.file_extracted(&files[index].name, text.chars().count(), completed, total);
                slots[index] = text;
            }
            Ok((index, Err(e))) => {
                failed += 1;
                warn!(file_id = %files[index].id, name = %files[index].name, error = %e, "extraction failed, using empty text");
                progress.file_extracted(&files[index].name, 0, completed, total);
            }
            Err(e) => {
                // A panicked task leaves its slot empty; the index is lost with the task.
                failed += 1;
                warn!(error = %e, "extraction task aborted");
            }
        }
    }

    info!(total, failed, "extraction complete");

    files
        .into_iter()
        .zip(slots)
        .map(|(file, text)| ExtractedText {
            file_id: file.id,
            text,
        })
        .collect()
}

/// Download one file and OCR it, each step under its own timeout.
async fn extract_one(
    store: &dyn FolderStore,
    detector: &dyn TextDetector,
    file: &SourceFile,
    opts: &ExtractionOptions,
) -> Result<String> {
    let bytes = timeout(opts.download_timeout, store.download_bytes(&file.id))
        .await
        .map_err(|_| LessonForgeError::extraction(&file.id, "download timed out"))??;

    if bytes.is_empty() {
        return Err(LessonForgeError::extraction(&file.id, "downloaded file is empty"));
    }

    let text = timeout(opts.ocr_timeout, detector.detect_text(&bytes))
        .await
        .map_err(|_| LessonForgeError::extraction(&file.id, "OCR timed out"))??;

    if text.trim().is_empty() {
        return Err(LessonForgeError::extraction(&file.id, "no text detected"));
    }

    debug!(file_id = %file.id, bytes = bytes.len(), chars = text.chars().count(), "file extracted");
    Ok(text)
}
