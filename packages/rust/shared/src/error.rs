//! Error types for LessonForge.
//!
//! Library crates use [`LessonForgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre`; the HTTP server maps it to status codes.

use std::path::PathBuf;

/// Top-level error type for all LessonForge operations.
#[derive(Debug, thiserror::Error)]
pub enum LessonForgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The request did not carry a usable folder identifier.
    #[error("folder id is missing")]
    MissingFolderId,

    /// The folder (or file) does not exist in the folder store.
    #[error("folder not found: {id}")]
    NotFound { id: String },

    /// The identifier resolved to something other than a folder.
    #[error("{id} is not a folder (mime type {mime_type})")]
    NotAFolder { id: String, mime_type: String },

    /// The folder holds no files of a supported image type.
    #[error("no images found in folder {id}")]
    NoImagesFound { id: String },

    /// The folder store refused access to a resource.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Granting the service identity access to a folder failed.
    #[error("access grant failed for {id}: {message}")]
    AccessGrantFailed { id: String, message: String },

    /// Download or OCR of a single file failed.
    #[error("extraction failed for {file_id}: {message}")]
    Extraction { file_id: String, message: String },

    /// The generative text service call failed (network, HTTP status, timeout).
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),

    /// The generative text service returned something that is not the expected JSON.
    #[error("synthesis output is malformed: {0}")]
    SynthesisMalformed(String),

    /// The run was cancelled before it completed.
    #[error("pipeline run cancelled")]
    Cancelled,

    /// Network/HTTP error talking to an external service.
    #[error("network error: {0}")]
    Network(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LessonForgeError>;

impl LessonForgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a per-file extraction error.
    pub fn extraction(file_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Extraction {
            file_id: file_id.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-friendly name of the variant, used in logs and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::MissingFolderId => "missing_folder_id",
            Self::NotFound { .. } => "not_found",
            Self::NotAFolder { .. } => "not_a_folder",
            Self::NoImagesFound { .. } => "no_images_found",
            Self::AccessDenied(_) => "access_denied",
            Self::AccessGrantFailed { .. } => "access_grant_failed",
            Self::Extraction { .. } => "extraction_failed",
            Self::SynthesisFailed(_) => "synthesis_failed",
            Self::SynthesisMalformed(_) => "synthesis_malformed",
            Self::Cancelled => "cancelled",
            Self::Network(_) => "network",
            Self::Storage(_) => "storage",
            Self::Io { .. } => "io",
            Self::Validation { .. } => "validation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = LessonForgeError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = LessonForgeError::NoImagesFound { id: "abc".into() };
        assert_eq!(err.to_string(), "no images found in folder abc");

        let err = LessonForgeError::NotAFolder {
            id: "abc".into(),
            mime_type: "image/png".into(),
        };
        assert!(err.to_string().contains("image/png"));
    }

    #[test]
    fn error_kind_names() {
        assert_eq!(LessonForgeError::Cancelled.kind(), "cancelled");
        assert_eq!(
            LessonForgeError::extraction("f1", "boom").kind(),
            "extraction_failed"
        );
        assert_eq!(
            LessonForgeError::SynthesisFailed("timeout".into()).kind(),
            "synthesis_failed"
        );
    }
}
