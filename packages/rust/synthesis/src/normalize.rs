//! Response normalizer: the contract boundary between the generative service and
//! everything downstream.
//!
//! [`normalize`] is total. Unparseable or wrongly-shaped documents become an
//! empty chapter list; missing or mistyped fields get documented defaults. No
//! other stage re-checks these fields.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use lessonforge_shared::{Chapter, ExplanationTable, LessonForgeError, Question, Result};

// ---------------------------------------------------------------------------
// Raw (loosely typed) shapes
// ---------------------------------------------------------------------------

/// A chapter object as the service sent it; every field optional and untyped.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawChapter {
    title: Option<Value>,
    content: Option<Value>,
    web_text: Option<Value>,
    questions: Option<Value>,
}

/// A question object as the service sent it.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawQuestion {
    question: Option<Value>,
    options: Option<Value>,
    correct_answers: Option<Value>,
    explanation: Option<Value>,
    explanation_images: Option<Value>,
    explanation_table: Option<Value>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse the reply strictly into its top-level array elements.
///
/// A surrounding Markdown code fence is removed first. When the body is not
/// JSON at all, an array embedded in surrounding prose is accepted. Fails with
/// `SynthesisMalformed` when no array can be found, or the body is JSON of
/// another kind.
pub fn parse_document(raw: &str) -> Result<Vec<Value>> {
    let body = strip_code_fence(raw);
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => match embedded_array(body) {
            Some(items) => {
                debug!("recovered array embedded in prose");
                return Ok(items);
            }
            None => {
                return Err(LessonForgeError::SynthesisMalformed(format!(
                    "not valid JSON: {e}"
                )));
            }
        },
    };

    match value {
        Value::Array(items) => Ok(items),
        other => Err(LessonForgeError::SynthesisMalformed(format!(
            "expected a JSON array, got {}",
            json_kind(&other)
        ))),
    }
}

/// Turn the raw reply into fully-populated chapters. Never fails.
pub fn normalize(raw: &str) -> Vec<Chapter> {
    let items = match parse_document(raw) {
        Ok(items) => items,
        Err(e) => {
            warn!(error = %e, "discarding synthesis output");
            return Vec::new();
        }
    };

    let chapters: Vec<Chapter> = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| normalize_chapter(index, item))
        .collect();

    debug!(chapters = chapters.len(), "synthesis output normalized");
    chapters
}

fn normalize_chapter(index: usize, item: Value) -> Chapter {
    let raw: RawChapter = if item.is_object() {
        serde_json::from_value(item).unwrap_or_default()
    } else {
        warn!(index, kind = json_kind(&item), "chapter is not an object, using defaults");
        RawChapter::default()
    };

    let title = text(raw.title.as_ref())
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| Chapter::placeholder_title(index));

    let questions = match raw.questions {
        Some(Value::Array(items)) => items.into_iter().filter_map(normalize_question).collect(),
        _ => Vec::new(),
    };

    Chapter {
        title,
        content: text(raw.content.as_ref()).unwrap_or_default(),
        web_text: text(raw.web_text.as_ref()).unwrap_or_default(),
        questions,
    }
}

fn normalize_question(item: Value) -> Option<Question> {
    if !item.is_object() {
        debug!(kind = json_kind(&item), "dropping non-object question");
        return None;
    }
    let raw: RawQuestion = serde_json::from_value(item).unwrap_or_default();

    Some(Question {
        question: text(raw.question.as_ref()).unwrap_or_default(),
        options: text_list(raw.options.as_ref()),
        correct_answers: answer_indices(raw.correct_answers.as_ref()),
        explanation: text(raw.explanation.as_ref()).unwrap_or_default(),
        explanation_images: text_list(raw.explanation_images.as_ref()),
        explanation_table: table(raw.explanation_table.as_ref()),
    })
}

// ---------------------------------------------------------------------------
// Field coercions
// ---------------------------------------------------------------------------

/// Scalars as text; `null`, arrays and objects are absent.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Array of scalars as text; anything else is an empty list.
fn text_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(|v| text(Some(v))).collect(),
        _ => Vec::new(),
    }
}

/// Answer indices, kept exactly as numbered by the service (1-based).
fn answer_indices(value: Option<&Value>) -> Vec<u32> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(index).collect(),
        Some(single) => index(single).into_iter().collect(),
        None => Vec::new(),
    }
}

fn index(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                u32::try_from(u).ok()
            } else {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= f64::from(u32::MAX))
                    .map(|f| f as u32)
            }
        }
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The explanation table, defaulting whichever part is missing.
fn table(value: Option<&Value>) -> ExplanationTable {
    let Some(Value::Object(obj)) = value else {
        return ExplanationTable::default();
    };

    let headers = match obj.get("headers") {
        Some(v @ Value::Array(_)) => text_list(Some(v)),
        _ => ExplanationTable::default_headers(),
    };

    let rows = match obj.get("rows") {
        Some(Value::Array(rows)) => rows
            .iter()
            .filter(|row| row.is_array())
            .map(|row| text_list(Some(row)))
            .collect(),
        _ => ExplanationTable::placeholder_rows(),
    };

    ExplanationTable { headers, rows }
}

/// Remove a surrounding Markdown code fence (```` ```json ... ``` ````), if any.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// The span from the first `[` to the last `]`, if it parses as an array.
fn embedded_array(body: &str) -> Option<Vec<Value>> {
    let start = body.find('[')?;
    let end = body.rfind(']')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&body[start..=end]) {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
