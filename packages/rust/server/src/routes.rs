use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use lessonforge_core::SilentProgress;
use lessonforge_shared::Chapter;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessImagesRequest {
    #[serde(default)]
    pub folder_id: Option<String>,
    /// Persist the generated chapters under this course.
    #[serde(default)]
    pub course_id: Option<String>,
}

/// `POST /process-images`: run the pipeline for one folder and return its chapters.
///
/// The pipeline future is dropped if the client disconnects, which aborts
/// in-flight extraction.
#[instrument(skip_all)]
pub async fn process_images(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ProcessImagesRequest>, JsonRejection>,
) -> Result<Json<Vec<Chapter>>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::MalformedPayload(e.body_text()))?;
    let folder_id = request.folder_id.unwrap_or_default();

    let result = state.pipeline.run(&folder_id, &SilentProgress).await?;

    let course_id = request
        .course_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    if let Some(course_id) = course_id {
        match &state.chapters {
            Some(store) => {
                store.save_chapters(course_id, &result.chapters).await?;
            }
            None => warn!(course_id, "courseId given but no chapter database is configured"),
        }
    }

    info!(
        folder_id = %result.folder_id,
        chapters = result.chapters.len(),
        elapsed_ms = result.elapsed.as_millis(),
        "process-images complete"
    );
    Ok(Json(result.chapters))
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
