//! libSQL persistence for generated chapters.
//!
//! [`ChapterStore`] keeps one row per course, chapters ordered by position,
//! and questions ordered by position within their chapter. Saving a course's
//! chapters replaces whatever was stored for it before, in one transaction.
//!
//! The store is shared by concurrent HTTP handlers. All access goes through
//! one connection behind an async mutex, held for a whole transaction, so
//! transactions never interleave.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use lessonforge_shared::{
    Chapter, ExplanationTable, LessonForgeError, Question, Result, StoredChapter,
};

/// Chapter database handle.
pub struct ChapterStore {
    // Kept alive for as long as the connection is.
    _db: Database,
    conn: Mutex<Connection>,
}

fn db_err(e: libsql::Error) -> LessonForgeError {
    LessonForgeError::Storage(e.to_string())
}

fn json_err(e: serde_json::Error) -> LessonForgeError {
    LessonForgeError::Storage(format!("invalid stored JSON: {e}"))
}

impl ChapterStore {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LessonForgeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let store = Self {
            _db: db,
            conn: Mutex::new(conn),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;
        let conn = self.conn.lock().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                conn.execute_batch(migration.sql).await.map_err(|e| {
                    LessonForgeError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn schema_version(&self) -> u32 {
        let conn = self.conn.lock().await;
        let result = conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            // Table doesn't exist yet
            Err(_) => 0,
        }
    }

    /// Store `chapters` as the full chapter list of `course_id`.
    ///
    /// Any chapters previously stored for the course are replaced. Ids are
    /// fresh UUID v7s and positions follow slice order, starting at 0.
    #[instrument(skip(self, chapters), fields(chapters = chapters.len()))]
    pub async fn save_chapters(
        &self,
        course_id: &str,
        chapters: &[Chapter],
    ) -> Result<Vec<StoredChapter>> {
        if course_id.trim().is_empty() {
            return Err(LessonForgeError::validation("course id must not be empty"));
        }

        let now = Utc::now();
        let now_str = now.to_rfc3339();
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await.map_err(db_err)?;

        tx.execute(
            "INSERT INTO courses (id, created_at, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
            params![course_id, now_str.as_str(), now_str.as_str()],
        )
        .await
        .map_err(db_err)?;

        tx.execute(
            "DELETE FROM questions WHERE chapter_id IN
             (SELECT id FROM chapters WHERE course_id = ?1)",
            params![course_id],
        )
        .await
        .map_err(db_err)?;
        tx.execute("DELETE FROM chapters WHERE course_id = ?1", params![course_id])
            .await
            .map_err(db_err)?;

        let mut stored = Vec::with_capacity(chapters.len());
        for (position, chapter) in chapters.iter().enumerate() {
            let id = Uuid::now_v7();
            tx.execute(
                "INSERT INTO chapters (id, course_id, position, title, content, web_text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.to_string(),
                    course_id,
                    position as i64,
                    chapter.title.as_str(),
                    chapter.content.as_str(),
                    chapter.web_text.as_str(),
                    now_str.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;

            for (q_position, question) in chapter.questions.iter().enumerate() {
                tx.execute(
                    "INSERT INTO questions (id, chapter_id, position, question, options_json,
                        correct_answers_json, explanation, explanation_images_json, explanation_table_json)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        Uuid::now_v7().to_string(),
                        id.to_string(),
                        q_position as i64,
                        question.question.as_str(),
                        serde_json::to_string(&question.options).map_err(json_err)?,
                        serde_json::to_string(&question.correct_answers).map_err(json_err)?,
                        question.explanation.as_str(),
                        serde_json::to_string(&question.explanation_images).map_err(json_err)?,
                        serde_json::to_string(&question.explanation_table).map_err(json_err)?,
                    ],
                )
                .await
                .map_err(db_err)?;
            }

            stored.push(StoredChapter {
                id,
                course_id: course_id.to_string(),
                position: position as u32,
                created_at: now,
                chapter: chapter.clone(),
            });
        }

        tx.commit().await.map_err(db_err)?;
        info!(course_id, chapters = stored.len(), "chapters saved");
        Ok(stored)
    }

    /// Stored chapters of `course_id` ordered by position, with their questions.
    pub async fn list_chapters(&self, course_id: &str) -> Result<Vec<StoredChapter>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT id, course_id, position, title, content, web_text, created_at
                 FROM chapters WHERE course_id = ?1 ORDER BY position",
                params![course_id],
            )
            .await
            .map_err(db_err)?;

        let mut chapters = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            chapters.push(row_to_stored_chapter(&row)?);
        }

        for stored in &mut chapters {
            stored.chapter.questions = list_questions(&conn, &stored.id).await?;
        }
        debug!(course_id, chapters = chapters.len(), "chapters loaded");
        Ok(chapters)
    }

    /// Remove every chapter of `course_id`. Returns how many were removed.
    pub async fn delete_course_chapters(&self, course_id: &str) -> Result<u64> {
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await.map_err(db_err)?;
        tx.execute(
            "DELETE FROM questions WHERE chapter_id IN
             (SELECT id FROM chapters WHERE course_id = ?1)",
            params![course_id],
        )
        .await
        .map_err(db_err)?;
        let removed = tx
            .execute("DELETE FROM chapters WHERE course_id = ?1", params![course_id])
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(removed)
    }
}

async fn list_questions(conn: &Connection, chapter_id: &Uuid) -> Result<Vec<Question>> {
    let mut rows = conn
        .query(
            "SELECT question, options_json, correct_answers_json, explanation,
                    explanation_images_json, explanation_table_json
             FROM questions WHERE chapter_id = ?1 ORDER BY position",
            params![chapter_id.to_string()],
        )
        .await
        .map_err(db_err)?;

    let mut questions = Vec::new();
    while let Some(row) = rows.next().await.map_err(db_err)? {
        questions.push(row_to_question(&row)?);
    }
    Ok(questions)
}

fn row_to_stored_chapter(row: &libsql::Row) -> Result<StoredChapter> {
    let id: String = row.get(0).map_err(db_err)?;
    let position: i64 = row.get(2).map_err(db_err)?;
    let created_at: String = row.get(6).map_err(db_err)?;

    Ok(StoredChapter {
        id: Uuid::parse_str(&id)
            .map_err(|e| LessonForgeError::Storage(format!("invalid chapter id {id}: {e}")))?,
        course_id: row.get(1).map_err(db_err)?,
        position: u32::try_from(position)
            .map_err(|_| LessonForgeError::Storage(format!("invalid position {position}")))?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| LessonForgeError::Storage(format!("invalid date: {e}")))?,
        chapter: Chapter {
            title: row.get(3).map_err(db_err)?,
            content: row.get(4).map_err(db_err)?,
            web_text: row.get(5).map_err(db_err)?,
            questions: Vec::new(),
        },
    })
}

fn row_to_question(row: &libsql::Row) -> Result<Question> {
    let options: String = row.get(1).map_err(db_err)?;
    let answers: String = row.get(2).map_err(db_err)?;
    let images: String = row.get(4).map_err(db_err)?;
    let table: String = row.get(5).map_err(db_err)?;

    Ok(Question {
        question: row.get(0).map_err(db_err)?,
        options: serde_json::from_str(&options).map_err(json_err)?,
        correct_answers: serde_json::from_str(&answers).map_err(json_err)?,
        explanation: row.get(3).map_err(db_err)?,
        explanation_images: serde_json::from_str(&images).map_err(json_err)?,
        explanation_table: serde_json::from_str::<ExplanationTable>(&table).map_err(json_err)?,
    })
}
