//! Folder store access: Drive client, source enumeration, and access bootstrap.
//!
//! The pipeline talks to the folder store only through the [`FolderStore`]
//! trait so tests (and other backends) can substitute their own implementation.
//! [`DriveClient`] is the production implementation over the Drive v3 REST API.

mod bootstrap;
mod client;
mod enumerate;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use lessonforge_shared::Result;

pub use bootstrap::ensure_access;
pub use client::DriveClient;
pub use enumerate::{list_images, sanitize_folder_id};

/// Media type the folder store reports for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Metadata of a single folder-store entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub id: String,
    pub name: String,
    pub mime_type: String,
}

impl FileMetadata {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

/// Capabilities the pipeline needs from a folder store.
#[async_trait]
pub trait FolderStore: Send + Sync {
    /// Metadata for `id`. Fails with `NotFound` when it does not exist.
    async fn get_metadata(&self, id: &str) -> Result<FileMetadata>;

    /// Every (non-trashed) entry whose parent is `folder_id`.
    async fn list_children(&self, folder_id: &str) -> Result<Vec<FileMetadata>>;

    /// Raw bytes of a file.
    async fn download_bytes(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Grant `principal` write access to `folder_id`.
    async fn grant_access(&self, folder_id: &str, principal: &str) -> Result<()>;

    /// Address of the identity this store authenticates as.
    async fn service_identity(&self) -> Result<String>;
}
