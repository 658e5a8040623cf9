//! Application configuration for chapterquiz.
//!
//! User config lives at `~/.chapterquiz/chapterquiz.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{QuizError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "chapterquiz.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".chapterquiz";

// ---------------------------------------------------------------------------
// Config structs (matching chapterquiz.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Question generation limits.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// OpenRouter settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Object storage settings for `s3://` locators.
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// libSQL database holding question sets and the chunk index.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Directory for per-run scratch files (system temp dir when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<String>,

    /// Upper bound on questions returned by a generation request, at most
    /// [`MAX_RESPONSE_QUESTIONS`].
    #[serde(default = "default_max_response_questions")]
    pub max_response_questions: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            scratch_dir: None,
            max_response_questions: default_max_response_questions(),
        }
    }
}

fn default_database_path() -> String {
    "~/.chapterquiz/chapterquiz.db".into()
}
/// Most questions a generation response may carry.
pub const MAX_RESPONSE_QUESTIONS: usize = 40;

fn default_max_response_questions() -> usize {
    MAX_RESPONSE_QUESTIONS
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Characters of retrieved chapter text sent to the model per chapter.
    #[serde(default = "default_chunk_char_budget")]
    pub chunk_char_budget: usize,

    /// Chunks retrieved per chapter.
    #[serde(default = "default_chunks_per_chapter")]
    pub chunks_per_chapter: usize,

    /// Most chapter names discovered per book.
    #[serde(default = "default_chapter_discovery_k")]
    pub chapter_discovery_k: usize,

    /// First `question_id` handed out for a book.
    #[serde(default = "default_first_question_id")]
    pub first_question_id: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            chunk_char_budget: default_chunk_char_budget(),
            chunks_per_chapter: default_chunks_per_chapter(),
            chapter_discovery_k: default_chapter_discovery_k(),
            first_question_id: default_first_question_id(),
        }
    }
}

fn default_chunk_char_budget() -> usize {
    6000
}
fn default_chunks_per_chapter() -> usize {
    10
}
fn default_chapter_discovery_k() -> usize {
    50
}
fn default_first_question_id() -> u32 {
    100
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for question generation and grading.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Chat-completions API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "meta-llama/llama-3.3-70b-instruct".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_temperature() -> f32 {
    0.3
}

/// `[object_store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// HTTP endpoint serving objects path-style as `{endpoint}/{bucket}/{key}`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_store_timeout(),
        }
    }
}

fn default_endpoint() -> String {
    "https://s3.amazonaws.com".into()
}
fn default_store_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Pipeline settings (runtime, derived from config)
// ---------------------------------------------------------------------------

/// Runtime limits for the generation and validation workflows.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Characters of chapter text per generation prompt.
    pub chunk_char_budget: usize,
    /// Chunks retrieved per chapter.
    pub chunks_per_chapter: usize,
    /// Most chapter names discovered per book.
    pub chapter_discovery_k: usize,
    /// First `question_id` of a book.
    pub first_question_id: u32,
    /// Hard cap on formatted questions.
    pub max_response_questions: usize,
    /// Where scratch files are created.
    pub scratch_dir: PathBuf,
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            chunk_char_budget: config.generation.chunk_char_budget,
            chunks_per_chapter: config.generation.chunks_per_chapter,
            chapter_discovery_k: config.generation.chapter_discovery_k,
            first_question_id: config.generation.first_question_id,
            max_response_questions: config
                .defaults
                .max_response_questions
                .min(MAX_RESPONSE_QUESTIONS),
            scratch_dir: config
                .defaults
                .scratch_dir
                .as_deref()
                .map(expand_path)
                .unwrap_or_else(std::env::temp_dir),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.chapterquiz/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| QuizError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.chapterquiz/chapterquiz.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| QuizError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| QuizError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| QuizError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| QuizError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| QuizError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the OpenRouter API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openrouter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(QuizError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_path(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
