use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::{error, warn};

use lessonforge_shared::LessonForgeError;

/// Error returned by HTTP handlers, rendered as `{ "error": ..., "details"?: ... }`.
#[derive(Debug)]
pub enum ApiError {
    /// The request body could not be read as the expected JSON.
    MalformedPayload(String),
    Pipeline(LessonForgeError),
}

impl From<LessonForgeError> for ApiError {
    fn from(e: LessonForgeError) -> Self {
        Self::Pipeline(e)
    }
}

/// HTTP status for a pipeline error.
pub fn status_for(e: &LessonForgeError) -> StatusCode {
    match e {
        LessonForgeError::MissingFolderId
        | LessonForgeError::NotAFolder { .. }
        | LessonForgeError::Validation { .. } => StatusCode::BAD_REQUEST,
        LessonForgeError::NotFound { .. } | LessonForgeError::NoImagesFound { .. } => {
            StatusCode::NOT_FOUND
        }
        LessonForgeError::AccessDenied(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn message_for(e: &LessonForgeError) -> String {
    match e {
        LessonForgeError::MissingFolderId => "folderId is required".into(),
        LessonForgeError::NotFound { .. } => "Folder not found".into(),
        LessonForgeError::NotAFolder { .. } => "The provided ID is not a folder".into(),
        LessonForgeError::NoImagesFound { .. } => "No images found in folder".into(),
        LessonForgeError::AccessDenied(_) => "Access to the folder was denied".into(),
        LessonForgeError::SynthesisFailed(_) | LessonForgeError::SynthesisMalformed(_) => {
            "Failed to generate chapters".into()
        }
        _ => "Failed to process images".into(),
    }
}

fn details_for(e: &LessonForgeError) -> Value {
    let mut details = json!({ "kind": e.kind(), "message": e.to_string() });
    match e {
        LessonForgeError::NotFound { id } | LessonForgeError::NoImagesFound { id } => {
            details["folderId"] = json!(id);
        }
        LessonForgeError::NotAFolder { id, mime_type } => {
            details["folderId"] = json!(id);
            details["mimeType"] = json!(mime_type);
        }
        _ => {}
    }
    details
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::MalformedPayload(reason) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Malformed request body", "details": { "message": reason } }),
            ),
            ApiError::Pipeline(e) => {
                let status = status_for(e);
                if status.is_server_error() {
                    error!(kind = e.kind(), error = %e, "request failed");
                } else {
                    warn!(kind = e.kind(), error = %e, "request rejected");
                }
                (
                    status,
                    json!({ "error": message_for(e), "details": details_for(e) }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
