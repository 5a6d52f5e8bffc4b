//! In-memory collaborator fakes for pipeline tests.
//!
//! Enabled for this crate's own tests and, through the `testing` feature, for
//! downstream test suites.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use lessonforge_drive::{FOLDER_MIME_TYPE, FileMetadata, FolderStore};
use lessonforge_ocr::TextDetector;
use lessonforge_shared::{LessonForgeError, Result};
use lessonforge_synthesis::TextGenerator;

/// Identity [`FakeDrive`] reports unless told otherwise.
pub const FAKE_SERVICE_IDENTITY: &str = "svc@lessonforge.test";

/// Folder store backed by maps. File bytes are the file id, so [`FakeOcr`]
/// can tell which file it is looking at.
pub struct FakeDrive {
    entries: HashMap<String, FileMetadata>,
    children: HashMap<String, Vec<String>>,
    identity: Option<String>,
    grant_fails: bool,
    calls: Mutex<Vec<String>>,
}

impl Default for FakeDrive {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            children: HashMap::new(),
            identity: Some(FAKE_SERVICE_IDENTITY.into()),
            grant_fails: false,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeDrive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the identity lookup fail.
    pub fn without_identity(mut self) -> Self {
        self.identity = None;
        self
    }

    /// Add a folder with the given children `(id, name, mime_type)`.
    pub fn with_folder(mut self, id: &str, children: &[(&str, &str, &str)]) -> Self {
        self.entries.insert(
            id.to_string(),
            FileMetadata {
                id: id.into(),
                name: format!("folder {id}"),
                mime_type: FOLDER_MIME_TYPE.into(),
            },
        );
        let mut ids = Vec::new();
        for (child_id, name, mime) in children {
            self.entries.insert(
                child_id.to_string(),
                FileMetadata {
                    id: child_id.to_string(),
                    name: name.to_string(),
                    mime_type: mime.to_string(),
                },
            );
            ids.push(child_id.to_string());
        }
        self.children.insert(id.to_string(), ids);
        self
    }

    /// Add a plain file that is not inside any listed folder.
    pub fn with_file(mut self, id: &str, name: &str, mime: &str) -> Self {
        self.entries.insert(
            id.to_string(),
            FileMetadata {
                id: id.into(),
                name: name.into(),
                mime_type: mime.into(),
            },
        );
        self
    }

    /// Make every access grant fail.
    pub fn failing_grants(mut self) -> Self {
        self.grant_fails = true;
        self
    }

    /// Calls received so far, formatted as `"<op>:<id>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl FolderStore for FakeDrive {
    async fn get_metadata(&self, id: &str) -> Result<FileMetadata> {
        self.record(format!("metadata:{id}"));
        self.entries
            .get(id)
            .cloned()
            .ok_or_else(|| LessonForgeError::NotFound { id: id.into() })
    }

    async fn list_children(&self, folder_id: &str) -> Result<Vec<FileMetadata>> {
        self.record(format!("list:{folder_id}"));
        Ok(self
            .children
            .get(folder_id)
            .map(|ids| ids.iter().filter_map(|id| self.entries.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    async fn download_bytes(&self, file_id: &str) -> Result<Vec<u8>> {
        self.record(format!("download:{file_id}"));
        if self.entries.contains_key(file_id) {
            Ok(file_id.as_bytes().to_vec())
        } else {
            Err(LessonForgeError::NotFound { id: file_id.into() })
        }
    }

    async fn grant_access(&self, folder_id: &str, principal: &str) -> Result<()> {
        self.record(format!("grant:{folder_id}:{principal}"));
        if self.grant_fails {
            Err(LessonForgeError::AccessGrantFailed {
                id: folder_id.into(),
                message: "already has access".into(),
            })
        } else {
            Ok(())
        }
    }

    async fn service_identity(&self) -> Result<String> {
        self.record("identity".into());
        self.identity
            .clone()
            .ok_or_else(|| LessonForgeError::Network("about: unavailable".into()))
    }
}

/// OCR returning scripted text per file id (the downloaded bytes).
#[derive(Default)]
pub struct FakeOcr {
    texts: HashMap<String, String>,
    failing: Vec<String>,
    delay: Option<Duration>,
    calls: Mutex<usize>,
    completed: Mutex<usize>,
}

impl FakeOcr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, file_id: &str, text: &str) -> Self {
        self.texts.insert(file_id.into(), text.into());
        self
    }

    pub fn failing_on(mut self, file_id: &str) -> Self {
        self.failing.push(file_id.into());
        self
    }

    /// Delay every call, for cancellation and timeout tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Calls started.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| *c).unwrap_or_default()
    }

    /// Calls that got past the delay.
    pub fn completed_count(&self) -> usize {
        self.completed.lock().map(|c| *c).unwrap_or_default()
    }
}

#[async_trait]
impl TextDetector for FakeOcr {
    async fn detect_text(&self, image: &[u8]) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Ok(mut completed) = self.completed.lock() {
            *completed += 1;
        }
        let id = String::from_utf8_lossy(image).to_string();
        if self.failing.contains(&id) {
            return Err(LessonForgeError::Network(format!("vision: failed on {id}")));
        }
        Ok(self.texts.get(&id).cloned().unwrap_or_default())
    }
}

/// Generative service returning a fixed reply and recording every prompt.
pub struct FakeGenerator {
    reply: std::result::Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// User texts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn complete(&self, _system_instruction: &str, user_text: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(user_text.to_string());
        }
        self.reply
            .clone()
            .map_err(LessonForgeError::SynthesisFailed)
    }
}
