//! Drive v3 REST implementation of [`FolderStore`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};

use lessonforge_shared::{DriveConfig, LessonForgeError, Result, resolve_secret};

use crate::{FileMetadata, FolderStore};

/// User-Agent string for folder-store requests.
const USER_AGENT: &str = concat!("LessonForge/", env!("CARGO_PKG_VERSION"));

/// Fields requested for every file resource.
const FILE_FIELDS: &str = "id, name, mimeType";

/// Largest page size the listing endpoint accepts.
const PAGE_SIZE: &str = "1000";

/// Default request timeout for metadata/listing calls.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// One page of a `files.list` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<FileMetadata>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// `about` response, reduced to the authenticated user's address.
#[derive(Debug, Deserialize)]
struct About {
    user: AboutUser,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutUser {
    #[serde(default)]
    email_address: Option<String>,
}

/// Folder-store client over the Drive v3 REST API, authenticated with a bearer token.
///
/// The token is static for the client's lifetime. Short-lived OAuth tokens
/// expire (typically after an hour), after which requests fail with
/// `AccessDenied`; long-running servers need a token that outlives them.
pub struct DriveClient {
    client: Client,
    api_base: String,
    access_token: String,
}

impl DriveClient {
    /// Create a client against `api_base` (e.g. `https://www.googleapis.com/drive/v3`).
    pub fn new(api_base: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| LessonForgeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    /// Build a client from the `[drive]` config section, reading the token from the environment.
    pub fn from_config(config: &DriveConfig) -> Result<Self> {
        let token = resolve_secret(&config.access_token_env, "Drive access token")?;
        Self::new(&config.api_base, token)
    }

    fn file_url(&self, id: &str) -> String {
        format!("{}/files/{id}", self.api_base)
    }
}

#[async_trait]
impl FolderStore for DriveClient {
    #[instrument(skip(self))]
    async fn get_metadata(&self, id: &str) -> Result<FileMetadata> {
        let response = self
            .client
            .get(self.file_url(id))
            .bearer_auth(&self.access_token)
            .query(&[("fields", FILE_FIELDS), ("supportsAllDrives", "true")])
            .send()
            .await
            .map_err(|e| LessonForgeError::Network(format!("metadata {id}: {e}")))?;

        let response = check_status(response, id).await?;
        response
            .json::<FileMetadata>()
            .await
            .map_err(|e| LessonForgeError::Network(format!("metadata {id}: invalid body: {e}")))
    }

    #[instrument(skip(self))]
    async fn list_children(&self, folder_id: &str) -> Result<Vec<FileMetadata>> {
        let query = format!(
            "'{}' in parents and trashed = false",
            folder_id.replace('\\', "\\\\").replace('\'', "\\'")
        );
        let fields = format!("nextPageToken, files({FILE_FIELDS})");
        let url = format!("{}/files", self.api_base);

        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&[
                    ("q", query.as_str()),
                    ("fields", fields.as_str()),
                    ("orderBy", "name"),
                    ("pageSize", PAGE_SIZE),
                    ("supportsAllDrives", "true"),
                    ("includeItemsFromAllDrives", "true"),
                ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| LessonForgeError::Network(format!("list {folder_id}: {e}")))?;
            let response = check_status(response, folder_id).await?;
            let page: FileList = response.json().await.map_err(|e| {
                LessonForgeError::Network(format!("list {folder_id}: invalid body: {e}"))
            })?;

            debug!(count = page.files.len(), "listed page of children");
            entries.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn download_bytes(&self, file_id: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.file_url(file_id))
            .bearer_auth(&self.access_token)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await
            .map_err(|e| LessonForgeError::Network(format!("download {file_id}: {e}")))?;

        let response = check_status(response, file_id).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| LessonForgeError::Network(format!("download {file_id}: {e}")))?;
        Ok(bytes.to_vec())
    }

    #[instrument(skip(self))]
    async fn grant_access(&self, folder_id: &str, principal: &str) -> Result<()> {
        let body = serde_json::json!({
            "role": "writer",
            "type": "user",
            "emailAddress": principal,
        });

        let response = self
            .client
            .post(format!("{}/permissions", self.file_url(folder_id)))
            .bearer_auth(&self.access_token)
            .query(&[("sendNotificationEmail", "false"), ("supportsAllDrives", "true")])
            .json(&body)
            .send()
            .await
            .map_err(|e| LessonForgeError::AccessGrantFailed {
                id: folder_id.to_string(),
                message: e.to_string(),
            })?;

        check_status(response, folder_id)
            .await
            .map(|_| ())
            .map_err(|e| LessonForgeError::AccessGrantFailed {
                id: folder_id.to_string(),
                message: e.to_string(),
            })
    }

    #[instrument(skip(self))]
    async fn service_identity(&self) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/about", self.api_base))
            .bearer_auth(&self.access_token)
            .query(&[("fields", "user(emailAddress)")])
            .send()
            .await
            .map_err(|e| LessonForgeError::Network(format!("about: {e}")))?;

        let response = check_status(response, "about").await?;
        let about: About = response
            .json()
            .await
            .map_err(|e| LessonForgeError::Network(format!("about: invalid body: {e}")))?;

        about
            .user
            .email_address
            .filter(|email| !email.trim().is_empty())
            .ok_or_else(|| LessonForgeError::Network("about: no email address for token".into()))
    }
}

/// Map non-success statuses onto the error taxonomy.
async fn check_status(response: Response, id: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let snippet = &body[..floor_char_boundary(&body, 200)];

    match status {
        StatusCode::NOT_FOUND => Err(LessonForgeError::NotFound { id: id.to_string() }),
        StatusCode::UNAUTHORIZED => Err(LessonForgeError::AccessDenied(format!(
            "{id}: access token rejected, it may have expired: HTTP {status}: {snippet}"
        ))),
        StatusCode::FORBIDDEN => Err(LessonForgeError::AccessDenied(format!(
            "{id}: HTTP {status}: {snippet}"
        ))),
        _ => Err(LessonForgeError::Network(format!(
            "{id}: HTTP {status}: {snippet}"
        ))),
    }
}

/// Largest char boundary in `s` that is `<= max`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> DriveClient {
        DriveClient::new(server.uri(), "test-token").expect("build client")
    }

    #[tokio::test]
    async fn get_metadata_parses_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/folder1"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "folder1",
                "name": "Scans",
                "mimeType": "application/vnd.google-apps.folder"
            })))
            .mount(&server)
            .await;

        let meta = client_for(&server).get_metadata("folder1").await.unwrap();
        assert_eq!(meta.name, "Scans");
        assert!(meta.is_folder());
    }

    #[tokio::test]
    async fn get_metadata_maps_404_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("File not found"))
            .mount(&server)
            .await;

        let err = client_for(&server).get_metadata("missing").await.unwrap_err();
        assert!(matches!(err, LessonForgeError::NotFound { ref id } if id == "missing"));
    }

    #[tokio::test]
    async fn get_metadata_maps_403_to_access_denied() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/private"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client_for(&server).get_metadata("private").await.unwrap_err();
        assert!(matches!(err, LessonForgeError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn expired_token_is_access_denied_with_hint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/folder1"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid Credentials"))
            .mount(&server)
            .await;

        let err = client_for(&server).get_metadata("folder1").await.unwrap_err();
        match err {
            LessonForgeError::AccessDenied(msg) => assert!(msg.contains("expired"), "{msg}"),
            other => panic!("expected AccessDenied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn service_identity_reads_about_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/about"))
            .and(query_param("fields", "user(emailAddress)"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "user": { "emailAddress": "svc@project.iam.gserviceaccount.com" }
            })))
            .mount(&server)
            .await;

        let email = client_for(&server).service_identity().await.unwrap();
        assert_eq!(email, "svc@project.iam.gserviceaccount.com");
    }

    #[tokio::test]
    async fn service_identity_without_email_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/about"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "user": {} })))
            .mount(&server)
            .await;

        assert!(client_for(&server).service_identity().await.is_err());
    }

    #[tokio::test]
    async fn list_children_follows_page_tokens() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param("pageToken", "next-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"id": "f2", "name": "b.png", "mimeType": "image/png"}]
            })))
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param("q", "'folder1' in parents and trashed = false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"id": "f1", "name": "a.png", "mimeType": "image/png"}],
                "nextPageToken": "next-1"
            })))
            .mount(&server)
            .await;

        let children = client_for(&server).list_children("folder1").await.unwrap();
        let ids: Vec<&str> = children.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "f2"]);
    }

    #[tokio::test]
    async fn download_bytes_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/img1"))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, 0x50, 0x4e, 0x47]))
            .mount(&server)
            .await;

        let bytes = client_for(&server).download_bytes("img1").await.unwrap();
        assert_eq!(bytes, vec![0x89, 0x50, 0x4e, 0x47]);
    }

    #[tokio::test]
    async fn grant_access_posts_writer_permission() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files/folder1/permissions"))
            .and(body_partial_json(serde_json::json!({
                "role": "writer",
                "type": "user",
                "emailAddress": "bot@example.com"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "perm1"})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .grant_access("folder1", "bot@example.com")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn grant_access_failure_is_access_grant_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files/folder1/permissions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("already has access"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .grant_access("folder1", "bot@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, LessonForgeError::AccessGrantFailed { .. }));
    }

    #[test]
    fn floor_char_boundary_respects_utf8() {
        let s = "項目項目";
        let idx = floor_char_boundary(s, 4);
        assert!(s.is_char_boundary(idx));
        assert_eq!(idx, 3);
    }
}
