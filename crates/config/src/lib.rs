//! Configuration loading, validation, and management for Lorekeeper.
//!
//! Loads configuration from `~/.lorekeeper/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use lorekeeper_core::context::{ContextConfig, ContextMode, ContextSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.lorekeeper/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Tier sizes and engine behaviour
    #[serde(default)]
    pub context: ContextSection,

    /// Main-text extraction rules for incoming turns
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// World book backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Record journal
    #[serde(default)]
    pub records: RecordsConfig,

    /// Summarizer backend
    #[serde(default)]
    pub summarizer: SummarizerConfig,
}

/// How the sync controller treats a mutation that arrives while another is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardPolicy {
    /// Wait for the running operation; served in arrival order.
    #[default]
    Queue,
    /// Fail immediately with `ConcurrencyRejected`.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSection {
    #[serde(default = "default_segment_count")]
    pub segment_count: usize,

    #[serde(default = "default_small_summary_count")]
    pub small_summary_count: usize,

    #[serde(default)]
    pub mode: ContextMode,

    /// Initial gate state when the world book holds no persisted settings
    #[serde(default)]
    pub enabled: bool,

    /// Records per summarizer call in the summary tiers
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default)]
    pub guard: GuardPolicy,
}

fn default_segment_count() -> usize {
    3
}
fn default_small_summary_count() -> usize {
    25
}
fn default_chunk_size() -> usize {
    5
}

impl ContextSection {
    /// The settings to start from when nothing is persisted yet.
    pub fn initial_settings(&self) -> ContextSettings {
        ContextSettings {
            mode: self.mode,
            enabled: self.enabled,
            config: ContextConfig::new(self.segment_count, self.small_summary_count),
        }
    }
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            segment_count: default_segment_count(),
            small_summary_count: default_small_summary_count(),
            mode: ContextMode::default(),
            enabled: false,
            chunk_size: default_chunk_size(),
            guard: GuardPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Tags whose whole block is dropped before summarizing (e.g. hidden reasoning)
    #[serde(default = "default_strip_tags")]
    pub strip_tags: Vec<String>,

    /// If set and present in a turn, only the text inside this tag is kept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_tag: Option<String>,
}

fn default_strip_tags() -> Vec<String> {
    vec!["think".into(), "thinking".into()]
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self { strip_tags: default_strip_tags(), main_tag: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "file" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// World book file (defaults to `~/.lorekeeper/world_book.json`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_store_backend() -> String {
    "file".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { backend: default_store_backend(), path: None }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordsConfig {
    /// JSONL journal (defaults to `~/.lorekeeper/records.jsonl`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<PathBuf>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// "extractive" or "openai_compat"
    #[serde(default = "default_summarizer_provider")]
    pub provider: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Hard cap on any produced summary
    #[serde(default = "default_max_summary_chars")]
    pub max_summary_chars: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_summarizer_provider() -> String {
    "extractive".into()
}
fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_max_summary_chars() -> usize {
    1200
}
fn default_temperature() -> f32 {
    0.2
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: default_summarizer_provider(),
            api_url: default_api_url(),
            model: default_model(),
            api_key: None,
            max_summary_chars: default_max_summary_chars(),
            temperature: default_temperature(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for SummarizerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarizerConfig")
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("max_summary_chars", &self.max_summary_chars)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.lorekeeper/config.toml).
    ///
    /// Environment overrides:
    /// - `LOREKEEPER_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `LOREKEEPER_MODEL`
    /// - `LOREKEEPER_API_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if self.summarizer.api_key.is_none() {
            self.summarizer.api_key = std::env::var("LOREKEEPER_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("LOREKEEPER_MODEL") {
            self.summarizer.model = model;
        }

        if let Ok(url) = std::env::var("LOREKEEPER_API_URL") {
            self.summarizer.api_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".lorekeeper")
    }

    /// Resolved world book path.
    pub fn world_book_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("world_book.json"))
    }

    /// Resolved record journal path.
    pub fn journal_path(&self) -> PathBuf {
        self.records
            .journal
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("records.jsonl"))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.context.chunk_size == 0 {
            return Err(ConfigError::ValidationError("context.chunk_size must be > 0".into()));
        }

        if !matches!(self.store.backend.as_str(), "file" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be 'file' or 'memory', got '{}'",
                self.store.backend
            )));
        }

        if !matches!(self.summarizer.provider.as_str(), "extractive" | "openai_compat") {
            return Err(ConfigError::ValidationError(format!(
                "summarizer.provider must be 'extractive' or 'openai_compat', got '{}'",
                self.summarizer.provider
            )));
        }

        if self.summarizer.max_summary_chars < 16 {
            return Err(ConfigError::ValidationError(
                "summarizer.max_summary_chars must be at least 16".into(),
            ));
        }

        if self.summarizer.temperature < 0.0 || self.summarizer.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "summarizer.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.context.segment_count, 3);
        assert_eq!(config.context.small_summary_count, 25);
        assert!(!config.context.enabled);
        assert_eq!(config.summarizer.provider, "extractive");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.context.chunk_size, config.context.chunk_size);
        assert_eq!(parsed.store.backend, config.store.backend);
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let mut config = AppConfig::default();
        config.context.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_backend_rejected() {
        let mut config = AppConfig::default();
        config.store.backend = "redis".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.context.guard, GuardPolicy::Queue);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[context]
segment_count = 0
mode = "full"
guard = "reject"

[extraction]
main_tag = "content"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.context.segment_count, 0);
        assert_eq!(config.context.small_summary_count, 25);
        assert_eq!(config.context.mode, ContextMode::Full);
        assert_eq!(config.context.guard, GuardPolicy::Reject);
        assert_eq!(config.extraction.main_tag.as_deref(), Some("content"));
        assert_eq!(config.extraction.strip_tags, vec!["think", "thinking"]);

        let settings = config.context.initial_settings();
        assert_eq!(settings.config, ContextConfig::new(0, 25));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[context\nsegment_count = ").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn api_key_redacted_in_debug() {
        let mut config = AppConfig::default();
        config.summarizer.api_key = Some("sk-secret".into());
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("segment_count"));
        assert!(toml_str.contains("extractive"));
    }
}
