//! Versioned schema for the chapter database.
//!
//! Migrations run in ascending order on open; each records its version in
//! `schema_migrations` so reopening a database is a no-op.

pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: courses, chapters, questions",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS courses (
    id         TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chapters (
    id         TEXT PRIMARY KEY,
    course_id  TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
    position   INTEGER NOT NULL,
    title      TEXT NOT NULL,
    content    TEXT NOT NULL,
    web_text   TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(course_id, position)
);

CREATE INDEX IF NOT EXISTS idx_chapters_course_id ON chapters(course_id);

-- List-valued question fields are stored as JSON text.
CREATE TABLE IF NOT EXISTS questions (
    id                      TEXT PRIMARY KEY,
    chapter_id              TEXT NOT NULL REFERENCES chapters(id) ON DELETE CASCADE,
    position                INTEGER NOT NULL,
    question                TEXT NOT NULL,
    options_json            TEXT NOT NULL,
    correct_answers_json    TEXT NOT NULL,
    explanation             TEXT NOT NULL,
    explanation_images_json TEXT NOT NULL,
    explanation_table_json  TEXT NOT NULL,
    UNIQUE(chapter_id, position)
);

CREATE INDEX IF NOT EXISTS idx_questions_chapter_id ON questions(chapter_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
