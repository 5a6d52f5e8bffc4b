//! Application configuration for LessonForge.
//!
//! User config lives at `~/.lessonforge/lessonforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LessonForgeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "lessonforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".lessonforge";

// ---------------------------------------------------------------------------
// Config structs (matching lessonforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Folder store (Google Drive) settings.
    #[serde(default)]
    pub drive: DriveConfig,

    /// OCR (Cloud Vision) settings.
    #[serde(default)]
    pub vision: VisionConfig,

    /// Generative text service settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Pipeline tuning.
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Chapter persistence.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Origins allowed by CORS. Empty allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".into()
}

/// `[drive]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Base URL of the Drive v3 REST API.
    #[serde(default = "default_drive_api_base")]
    pub api_base: String,

    /// Name of the env var holding the OAuth access token (never store the token itself).
    #[serde(default = "default_drive_token_env")]
    pub access_token_env: String,

    /// Email granted access to target folders. When unset, the identity the
    /// access token belongs to is looked up from the folder store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_email: Option<String>,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: default_drive_api_base(),
            access_token_env: default_drive_token_env(),
            service_account_email: None,
        }
    }
}

fn default_drive_api_base() -> String {
    "https://www.googleapis.com/drive/v3".into()
}
fn default_drive_token_env() -> String {
    "LESSONFORGE_DRIVE_TOKEN".into()
}

/// `[vision]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Base URL of the Cloud Vision REST API.
    #[serde(default = "default_vision_api_base")]
    pub api_base: String,

    /// Name of the env var holding the Vision API key.
    #[serde(default = "default_vision_key_env")]
    pub api_key_env: String,

    /// Optional language hints passed to text detection (e.g. `["ja", "en"]`).
    #[serde(default)]
    pub language_hints: Vec<String>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_base: default_vision_api_base(),
            api_key_env: default_vision_key_env(),
            language_hints: Vec::new(),
        }
    }
}

fn default_vision_api_base() -> String {
    "https://vision.googleapis.com/v1".into()
}
fn default_vision_key_env() -> String {
    "GOOGLE_VISION_API_KEY".into()
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,

    /// Model used for curriculum synthesis.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_llm_api_base(),
            api_key_env: default_llm_key_env(),
            model: default_model(),
            temperature: default_temperature(),
        }
    }
}

fn default_llm_api_base() -> String {
    "https://api.openai.com/v1".into()
}
fn default_llm_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.7
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Maximum files downloaded/OCR'd at the same time.
    #[serde(default = "default_extraction_concurrency")]
    pub extraction_concurrency: usize,

    /// Timeout for a single file download.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// Timeout for a single OCR call.
    #[serde(default = "default_ocr_timeout")]
    pub ocr_timeout_secs: u64,

    /// Timeout for the synthesis call.
    #[serde(default = "default_synthesis_timeout")]
    pub synthesis_timeout_secs: u64,

    /// Media types accepted by the enumerator.
    #[serde(default = "default_image_mime_types")]
    pub image_mime_types: Vec<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            extraction_concurrency: default_extraction_concurrency(),
            download_timeout_secs: default_download_timeout(),
            ocr_timeout_secs: default_ocr_timeout(),
            synthesis_timeout_secs: default_synthesis_timeout(),
            image_mime_types: default_image_mime_types(),
        }
    }
}

fn default_extraction_concurrency() -> usize {
    8
}
fn default_download_timeout() -> u64 {
    30
}
fn default_ocr_timeout() -> u64 {
    60
}
fn default_synthesis_timeout() -> u64 {
    300
}
fn default_image_mime_types() -> Vec<String> {
    vec!["image/png".into(), "image/jpeg".into()]
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the chapter database. Persistence is disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration derived from [`PipelineSettings`] and `[drive]`.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Fan-out width of the extraction stage (at least 1).
    pub extraction_concurrency: usize,
    pub download_timeout: Duration,
    pub ocr_timeout: Duration,
    pub synthesis_timeout: Duration,
    /// Media types accepted by the enumerator.
    pub image_mime_types: Vec<String>,
    /// Principal granted access during bootstrap, if any.
    pub service_account_email: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        let p = &config.pipeline;
        Self {
            extraction_concurrency: p.extraction_concurrency.max(1),
            download_timeout: Duration::from_secs(p.download_timeout_secs),
            ocr_timeout: Duration::from_secs(p.ocr_timeout_secs),
            synthesis_timeout: Duration::from_secs(p.synthesis_timeout_secs),
            image_mime_types: p.image_mime_types.clone(),
            service_account_email: config
                .drive
                .service_account_email
                .clone()
                .filter(|e| !e.trim().is_empty()),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.lessonforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LessonForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.lessonforge/lessonforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LessonForgeError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        LessonForgeError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LessonForgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LessonForgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LessonForgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the env var named `var_name`. `what` names the secret in the error.
pub fn resolve_secret(var_name: &str, what: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(LessonForgeError::config(format!(
            "{what} not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that every secret the pipeline needs is present.
pub fn validate_secrets(config: &AppConfig) -> Result<()> {
    resolve_secret(&config.drive.access_token_env, "Drive access token")?;
    resolve_secret(&config.vision.api_key_env, "Vision API key")?;
    resolve_secret(&config.llm.api_key_env, "LLM API key")?;
    Ok(())
}
