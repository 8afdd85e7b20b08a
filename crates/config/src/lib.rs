//! Configuration loading, validation, and management for cryslgen.
//!
//! Loads configuration from `./cryslgen.toml` (or `~/.cryslgen/config.toml`)
//! with environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// File name looked up in the working directory before the home config.
pub const LOCAL_CONFIG_FILE: &str = "cryslgen.toml";

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Completion/embedding backend: "openai", "openrouter", "ollama" or "custom:<url>"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Chat/completion model
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding model used for the reference index and retrieval queries
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per generated explanation or example
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub dependencies: DependencyConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    1600
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("paths", &self.paths)
            .field("retrieval", &self.retrieval)
            .field("dependencies", &self.dependencies)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Where rules, sanitized records, caches and the reference document live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding `<SimpleName>.crysl` sources
    #[serde(default = "default_rules_dir")]
    pub rules_dir: PathBuf,

    /// Directory holding `sanitized_rule_<fqcn>_<lang>.json` records
    #[serde(default = "default_sanitized_dir")]
    pub sanitized_dir: PathBuf,

    /// Cached natural-language explanations (`<class>_<lang>.txt`)
    #[serde(default = "default_explanation_cache_dir")]
    pub explanation_cache_dir: PathBuf,

    /// Persisted embedding index for the reference document
    #[serde(default = "default_index_cache_dir")]
    pub index_cache_dir: PathBuf,

    /// Reference document used for retrieval (PDF or plain text)
    #[serde(default = "default_reference_document")]
    pub reference_document: PathBuf,
}

fn default_rules_dir() -> PathBuf {
    PathBuf::from("src/main/resources/CrySLRules")
}
fn default_sanitized_dir() -> PathBuf {
    PathBuf::from("llm/sanitized_rules")
}
fn default_explanation_cache_dir() -> PathBuf {
    PathBuf::from("Output/resources/llm_cache")
}
fn default_index_cache_dir() -> PathBuf {
    PathBuf::from("rag_cache")
}
fn default_reference_document() -> PathBuf {
    PathBuf::from("tse19CrySL.pdf")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            rules_dir: default_rules_dir(),
            sanitized_dir: default_sanitized_dir(),
            explanation_cache_dir: default_explanation_cache_dir(),
            index_cache_dir: default_index_cache_dir(),
            reference_document: default_reference_document(),
        }
    }
}

/// How retrieval queries are built from rule sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStyle {
    /// Vocabulary hint followed by the raw section texts
    Composite,
    /// Deduplicated identifier tokens joined with ` | `
    Keywords,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Excerpt length cap when injecting retrieved chunks into a prompt
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    #[serde(default = "default_chunk_max_chars")]
    pub chunk_max_chars: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Embed all chunks in one provider call instead of one call per chunk
    #[serde(default = "default_true")]
    pub batch_embeddings: bool,

    #[serde(default = "default_query_style")]
    pub query: QueryStyle,
}

fn default_true() -> bool {
    true
}
fn default_top_k() -> usize {
    6
}
fn default_max_chunk_chars() -> usize {
    900
}
fn default_chunk_max_chars() -> usize {
    1800
}
fn default_chunk_overlap() -> usize {
    300
}
fn default_query_style() -> QueryStyle {
    QueryStyle::Composite
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: default_top_k(),
            max_chunk_chars: default_max_chunk_chars(),
            chunk_max_chars: default_chunk_max_chars(),
            chunk_overlap: default_chunk_overlap(),
            batch_embeddings: true,
            query: default_query_style(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyConfig {
    /// How many levels of `dependency` links to follow when collecting ENSURES
    #[serde(default = "default_ensures_depth")]
    pub ensures_depth: usize,

    /// Language tried after the requested one when loading sanitized records
    #[serde(default = "default_fallback_language")]
    pub fallback_language: String,
}

fn default_ensures_depth() -> usize {
    1
}
fn default_fallback_language() -> String {
    "English".into()
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            ensures_depth: default_ensures_depth(),
            fallback_language: default_fallback_language(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from `./cryslgen.toml`, falling back to
    /// `~/.cryslgen/config.toml`, then apply environment overrides.
    ///
    /// Environment variables:
    /// - `CRYSLGEN_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `CRYSLGEN_PROVIDER`, `CRYSLGEN_MODEL`, `CRYSLGEN_EMBEDDING_MODEL`
    /// - `OLLAMA_URL` (api_url of the `ollama` provider)
    pub fn load() -> Result<Self, ConfigError> {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        let path = if local.exists() {
            local
        } else {
            Self::config_dir().join("config.toml")
        };
        Self::load_with_env(&path)
    }

    /// Load a specific file and apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    /// Apply overrides from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.is_none() {
            self.api_key = lookup("CRYSLGEN_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(provider) = lookup("CRYSLGEN_PROVIDER") {
            self.provider = provider;
        }
        if let Some(model) = lookup("CRYSLGEN_MODEL") {
            self.model = model;
        }
        if let Some(model) = lookup("CRYSLGEN_EMBEDDING_MODEL") {
            self.embedding_model = model;
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.providers
                .entry("ollama".into())
                .or_insert_with(|| ProviderConfig {
                    api_key: None,
                    api_url: None,
                })
                .api_url = Some(url);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".cryslgen")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k must be at least 1".into(),
            ));
        }

        if self.retrieval.chunk_overlap >= self.retrieval.chunk_max_chars {
            return Err(ConfigError::ValidationError(
                "retrieval.chunk_overlap must be smaller than retrieval.chunk_max_chars".into(),
            ));
        }

        if self.dependencies.ensures_depth == 0 {
            return Err(ConfigError::ValidationError(
                "dependencies.ensures_depth must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            paths: PathsConfig::default(),
            retrieval: RetrievalConfig::default(),
            dependencies: DependencyConfig::default(),
            providers: HashMap::new(),
        }
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
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.retrieval.top_k, 6);
        assert_eq!(config.dependencies.ensures_depth, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider, config.provider);
        assert_eq!(parsed.retrieval.chunk_max_chars, 1800);
        assert_eq!(parsed.paths.index_cache_dir, PathBuf::from("rag_cache"));
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn overlap_must_be_below_chunk_size() {
        let mut config = AppConfig::default();
        config.retrieval.chunk_overlap = 1800;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/cryslgen.toml"));
        let config = result.unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
provider = "ollama"
model = "llama3"

[retrieval]
top_k = 4
query = "keywords"

[paths]
rules_dir = "rules"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.retrieval.query, QueryStyle::Keywords);
        assert_eq!(config.retrieval.max_chunk_chars, 900);
        assert_eq!(config.paths.rules_dir, PathBuf::from("rules"));
        assert_eq!(config.paths.sanitized_dir, PathBuf::from("llm/sanitized_rules"));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "provider = [").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-env"),
            ("CRYSLGEN_MODEL", "gpt-4o"),
            ("OLLAMA_URL", "http://gpu-box:11434"),
        ]
        .into_iter()
        .collect();

        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(
            config.providers["ollama"].api_url.as_deref(),
            Some("http://gpu-box:11434")
        );
        assert!(config.has_api_key());
    }

    #[test]
    fn explicit_api_key_wins_over_env() {
        let mut config = AppConfig {
            api_key: Some("sk-file".into()),
            ..AppConfig::default()
        };
        config.apply_env(|k| (k == "OPENAI_API_KEY").then(|| "sk-env".to_string()));
        assert_eq!(config.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn debug_output_redacts_keys() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o-mini"));
        assert!(toml_str.contains("[retrieval]"));
    }
}
