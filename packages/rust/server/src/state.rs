use std::path::Path;
use std::sync::Arc;

use lessonforge_core::Pipeline;
use lessonforge_shared::{AppConfig, Result};
use lessonforge_storage::ChapterStore;
use tracing::info;

/// Shared handler state.
pub struct AppState {
    pub pipeline: Pipeline,
    /// Present when `[storage] db_path` is configured.
    pub chapters: Option<ChapterStore>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, chapters: Option<ChapterStore>) -> Arc<Self> {
        Arc::new(Self { pipeline, chapters })
    }

    /// Build the production pipeline and open the chapter database, if configured.
    pub async fn from_config(config: &AppConfig) -> Result<Arc<Self>> {
        let pipeline = Pipeline::from_config(config)?;

        let chapters = match config.storage.db_path.as_deref() {
            Some(path) => {
                info!(db_path = path, "opening chapter database");
                Some(ChapterStore::open(Path::new(path)).await?)
            }
            None => None,
        };

        Ok(Self::new(pipeline, chapters))
    }
}
