//! Source enumeration: list a folder and keep its images in a stable order.

use tracing::{info, instrument};

use lessonforge_shared::{LessonForgeError, Result, SourceFile};

use crate::FolderStore;

/// Clean a caller-supplied folder id.
///
/// Surrounding whitespace and trailing characters that cannot occur in a
/// folder id (anything outside `[A-Za-z0-9_-]`) are stripped, so `"abc123."`
/// becomes `"abc123"`. Returns `None` when nothing usable is left.
pub fn sanitize_folder_id(raw: &str) -> Option<String> {
    let cleaned = raw.trim().trim_end_matches(|c: char| !is_id_char(c));
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// List the images in `folder_id`, sorted by display name.
///
/// Fails with `NotFound` when the folder does not exist, `NotAFolder` when the
/// id resolves to a file, and `NoImagesFound` when nothing matches `allowed_types`.
#[instrument(skip(store, allowed_types))]
pub async fn list_images(
    store: &dyn FolderStore,
    folder_id: &str,
    allowed_types: &[String],
) -> Result<Vec<SourceFile>> {
    let meta = store.get_metadata(folder_id).await?;
    if !meta.is_folder() {
        return Err(LessonForgeError::NotAFolder {
            id: folder_id.to_string(),
            mime_type: meta.mime_type,
        });
    }

    let mut children = store.list_children(folder_id).await?;
    let listed = children.len();
    children.sort_by(|a, b| a.name.cmp(&b.name));

    let images: Vec<SourceFile> = children
        .into_iter()
        .filter(|entry| {
            allowed_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&entry.mime_type))
        })
        .map(|entry| SourceFile {
            id: entry.id,
            name: entry.name,
            mime_type: entry.mime_type,
            parent_id: folder_id.to_string(),
        })
        .collect();

    if images.is_empty() {
        return Err(LessonForgeError::NoImagesFound {
            id: folder_id.to_string(),
        });
    }

    info!(folder = %meta.name, listed, images = images.len(), "enumerated source images");
    Ok(images)
}
