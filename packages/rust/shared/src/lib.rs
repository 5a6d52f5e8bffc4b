//! Shared types, error model, and configuration for LessonForge.
//!
//! This crate is the foundation depended on by all other LessonForge crates.
//! It provides:
//! - [`LessonForgeError`] — the unified error type
//! - Domain types ([`SourceFile`], [`ExtractedText`], [`Corpus`], [`Chapter`], [`Question`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DriveConfig, LlmConfig, PipelineConfig, PipelineSettings, ServerConfig,
    StorageConfig, VisionConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, resolve_secret, validate_secrets,
};
pub use error::{LessonForgeError, Result};
pub use types::{
    CORPUS_SEPARATOR, Chapter, Corpus, DEFAULT_TABLE_HEADERS, ExplanationTable, ExtractedText,
    Question, SourceFile, StoredChapter,
};
