//! Text extraction: OCR client and the failure-isolated extraction fan-out.
//!
//! This crate provides:
//! - [`TextDetector`] — the OCR capability the pipeline depends on
//! - [`VisionClient`] — Cloud Vision `images:annotate` implementation
//! - [`extract_all`] — bounded, order-preserving per-file download + OCR

mod fanout;
mod vision;

use async_trait::async_trait;

use lessonforge_shared::Result;

pub use fanout::{ExtractionOptions, ExtractionProgress, SilentExtractionProgress, extract_all};
pub use vision::VisionClient;

/// Optical character recognition over raw image bytes.
#[async_trait]
pub trait TextDetector: Send + Sync {
    /// Full text recognised in the image. Empty when the image holds no text.
    async fn detect_text(&self, image: &[u8]) -> Result<String>;
}
