//! Best-effort access bootstrap for target folders.

use tracing::{debug, info, instrument, warn};

use crate::FolderStore;

/// Grant the pipeline's service identity access to `folder_id`, logging and
/// swallowing any failure.
///
/// `principal` overrides the identity; without it the store is asked who it
/// authenticates as. Granting twice is harmless. Listing may still succeed on
/// folders that are already shared, so a failure here never stops the run.
#[instrument(skip(store))]
pub async fn ensure_access(store: &dyn FolderStore, folder_id: &str, principal: Option<&str>) {
    let principal = match principal {
        Some(p) => p.to_string(),
        None => match store.service_identity().await {
            Ok(identity) => {
                debug!(%identity, "resolved service identity from folder store");
                identity
            }
            Err(e) => {
                warn!(error = %e, "cannot resolve service identity, skipping access bootstrap");
                return;
            }
        },
    };

    match store.grant_access(folder_id, &principal).await {
        Ok(()) => info!("folder access granted"),
        Err(e) => warn!(error = %e, "access bootstrap failed, continuing"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use lessonforge_shared::{LessonForgeError, Result};

    use crate::FileMetadata;

    #[derive(Default)]
    struct RecordingStore {
        grants: Mutex<Vec<(String, String)>>,
        identity: Option<String>,
        fail: bool,
    }

    #[async_trait]
    impl FolderStore for RecordingStore {
        async fn get_metadata(&self, id: &str) -> Result<FileMetadata> {
            Err(LessonForgeError::NotFound { id: id.into() })
        }
        async fn list_children(&self, _folder_id: &str) -> Result<Vec<FileMetadata>> {
            Ok(vec![])
        }
        async fn download_bytes(&self, _file_id: &str) -> Result<Vec<u8>> {
            Ok(vec![])
        }
        async fn grant_access(&self, folder_id: &str, principal: &str) -> Result<()> {
            self.grants
                .lock()
                .unwrap()
                .push((folder_id.into(), principal.into()));
            if self.fail {
                Err(LessonForgeError::AccessGrantFailed {
                    id: folder_id.into(),
                    message: "already has access".into(),
                })
            } else {
                Ok(())
            }
        }
        async fn service_identity(&self) -> Result<String> {
            self.identity
                .clone()
                .ok_or_else(|| LessonForgeError::Network("about: unavailable".into()))
        }
    }

    #[tokio::test]
    async fn grants_to_configured_principal() {
        let store = RecordingStore::default();
        ensure_access(&store, "folder1", Some("bot@example.com")).await;
        let grants = store.grants.lock().unwrap();
        assert_eq!(
            grants.as_slice(),
            &[("folder1".to_string(), "bot@example.com".to_string())]
        );
    }

    #[tokio::test]
    async fn falls_back_to_store_identity() {
        let store = RecordingStore {
            identity: Some("svc@example.iam".into()),
            ..Default::default()
        };
        ensure_access(&store, "folder1", None).await;
        let grants = store.grants.lock().unwrap();
        assert_eq!(
            grants.as_slice(),
            &[("folder1".to_string(), "svc@example.iam".to_string())]
        );
    }

    #[tokio::test]
    async fn configured_principal_wins_over_store_identity() {
        let store = RecordingStore {
            identity: Some("svc@example.iam".into()),
            ..Default::default()
        };
        ensure_access(&store, "folder1", Some("bot@example.com")).await;
        assert_eq!(store.grants.lock().unwrap()[0].1, "bot@example.com");
    }

    #[tokio::test]
    async fn skips_when_identity_is_unknown() {
        let store = RecordingStore::default();
        ensure_access(&store, "folder1", None).await;
        assert!(store.grants.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_is_swallowed() {
        let store = RecordingStore {
            fail: true,
            ..Default::default()
        };
        // Completes without panicking or returning an error.
        ensure_access(&store, "folder1", Some("bot@example.com")).await;
        assert_eq!(store.grants.lock().unwrap().len(), 1);
    }
}
