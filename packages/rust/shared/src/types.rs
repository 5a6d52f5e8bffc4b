//! Core domain types for LessonForge curriculum synthesis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header row used when the synthesizer omits an explanation table.
pub const DEFAULT_TABLE_HEADERS: [&str; 2] = ["項目", "説明"];

/// Separator placed between per-file texts in the aggregated corpus.
pub const CORPUS_SEPARATOR: &str = "\n\n";

// ---------------------------------------------------------------------------
// SourceFile / ExtractedText / Corpus
// ---------------------------------------------------------------------------

/// A file listed from the folder store, selected for text extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Folder-store identifier of the file.
    pub id: String,
    /// Display name; the enumeration order is by this field.
    pub name: String,
    /// Media type reported by the folder store (e.g. `image/png`).
    pub mime_type: String,
    /// Identifier of the folder the file was listed from.
    pub parent_id: String,
}

/// Text recognised in one source file. Empty when extraction failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub file_id: String,
    pub text: String,
}

impl ExtractedText {
    /// The empty contribution a failed file degrades to.
    pub fn empty(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            text: String::new(),
        }
    }
}

/// The aggregated text blob sent to the generative text service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus(String);

impl Corpus {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the corpus holds nothing but separators/whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for Corpus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Chapter / Question
// ---------------------------------------------------------------------------

/// Headers and rows shown alongside a question's explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplanationTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExplanationTable {
    /// Header row used when none was supplied.
    pub fn default_headers() -> Vec<String> {
        DEFAULT_TABLE_HEADERS.iter().map(|h| h.to_string()).collect()
    }

    /// A single blank row, used when no rows were supplied.
    pub fn placeholder_rows() -> Vec<Vec<String>> {
        vec![vec![String::new(), String::new()]]
    }
}

impl Default for ExplanationTable {
    fn default() -> Self {
        Self {
            headers: Self::default_headers(),
            rows: Self::placeholder_rows(),
        }
    }
}

/// A multiple-choice quiz question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question: String,
    pub options: Vec<String>,
    /// Correct options as 1-based indices into `options`.
    pub correct_answers: Vec<u32>,
    pub explanation: String,
    pub explanation_images: Vec<String>,
    pub explanation_table: ExplanationTable,
}

impl Question {
    /// Correct answers as 0-based indices, for consumers that index `options` directly.
    /// Entries of `0` (invalid in the 1-based convention) are skipped.
    pub fn zero_based_answers(&self) -> Vec<usize> {
        self.correct_answers
            .iter()
            .filter(|&&n| n > 0)
            .map(|&n| (n - 1) as usize)
            .collect()
    }
}

/// A lesson unit produced by synthesis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub title: String,
    /// Short summary of the chapter.
    pub content: String,
    /// Detailed lesson body.
    pub web_text: String,
    pub questions: Vec<Question>,
}

impl Chapter {
    /// Title used for chapter `index` (0-based) when the synthesizer gave none.
    pub fn placeholder_title(index: usize) -> String {
        format!("Chapter {}", index + 1)
    }
}

// ---------------------------------------------------------------------------
// StoredChapter
// ---------------------------------------------------------------------------

/// A chapter after the persistence collaborator assigned it an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredChapter {
    pub id: Uuid,
    pub course_id: String,
    /// 0-based position within the course.
    pub position: u32,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub chapter: Chapter,
}
