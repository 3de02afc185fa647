
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::embeddings::chunking::ChunkingConfig;
use crate::embeddings::openai::{DEFAULT_EMBEDDING_DIMENSION, EmbeddingProvider};

const APP_DIR_NAME: &str = "flame-docs-mcp";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Where this configuration was loaded from
    #[serde(skip)]
    pub config_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    /// Azure resource endpoint or OpenAI-compatible base URL
    pub endpoint: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    pub api_version: String,
    /// Model name; the deployment name for Azure
    pub model: String,
    pub dimension: usize,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub batch_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Azure,
            endpoint: String::new(),
            api_key: String::new(),
            api_version: "2024-02-01".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            max_retries: 3,
            base_delay_ms: 1000,
            batch_delay_ms: 100,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QdrantConfig {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub collection: String,
    pub timeout_secs: u64,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            api_key: None,
            collection: "flame_docs".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the Markdown documentation tree
    pub source_dir: PathBuf,
    /// Documentation version stamped on every chunk
    pub version: String,
    pub state_file: PathBuf,
    pub error_file: PathBuf,
    /// Save the processing state after this many completed files
    pub save_interval: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("_build/markdown"),
            version: "1.29.0".to_string(),
            state_file: PathBuf::from("processing_state.json"),
            error_file: PathBuf::from("processing_errors.json"),
            save_interval: 10,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(usize),
    #[error("Invalid retry count: {0} (must be between 1 and 20)")]
    InvalidRetryCount(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid collection name: '{0}' (cannot be empty)")]
    InvalidCollection(String),
    #[error("Invalid target chunk size: {0} (must be greater than 0)")]
    InvalidTargetChunkSize(usize),
    #[error("Overlap ({0}) must be smaller than target chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Min chunk size ({0}) must be smaller than target chunk size ({1})")]
    MinChunkSizeTooLarge(usize, usize),
    #[error("Invalid save interval: {0} (must be greater than 0)")]
    InvalidSaveInterval(usize),
    #[error("Invalid documentation version: '{0}' (cannot be empty)")]
    InvalidVersion(String),
    #[error("Invalid value for {name}: '{value}'")]
    InvalidEnvValue { name: String, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Load the configuration file, apply environment overrides and validate.
    ///
    /// `path` defaults to [`Config::default_config_path`]. A missing file yields
    /// the defaults.
    #[inline]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };

        let mut config = Self::load_file(&config_path)?;
        config
            .apply_env(|name| std::env::var(name).ok())
            .context("Invalid environment override")?;

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Read a configuration file without environment overrides or validation
    #[inline]
    pub fn load_file(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self {
                config_path: config_path.to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.config_path = config_path.to_path_buf();

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;

        Ok(())
    }

    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Recognises `OPENAI_API_KEY`, `OPENAI_API_BASE`, `OPENAI_API_TYPE`,
    /// `OPENAI_API_VERSION`, `OPENAI_MODEL_NAME`, `OPENAI_MAX_RETRIES`,
    /// `OPENAI_BASE_DELAY` and `OPENAI_BATCH_DELAY` (seconds), `QDRANT_HOST`,
    /// `QDRANT_PORT`, `QDRANT_API_KEY` and `COLLECTION_NAME`.
    #[inline]
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = get("OPENAI_API_KEY") {
            self.embedding.api_key = key;
        }
        if let Some(base) = get("OPENAI_API_BASE") {
            self.embedding.endpoint = base;
        }
        if let Some(kind) = get("OPENAI_API_TYPE") {
            self.embedding.provider = match kind.trim().to_lowercase().as_str() {
                "azure" => EmbeddingProvider::Azure,
                "openai" => EmbeddingProvider::OpenAi,
                _ => return Err(invalid_env("OPENAI_API_TYPE", &kind)),
            };
        }
        if let Some(version) = get("OPENAI_API_VERSION") {
            self.embedding.api_version = version;
        }
        if let Some(model) = get("OPENAI_MODEL_NAME") {
            self.embedding.model = model;
        }
        if let Some(retries) = get("OPENAI_MAX_RETRIES") {
            self.embedding.max_retries = retries
                .trim()
                .parse()
                .map_err(|_| invalid_env("OPENAI_MAX_RETRIES", &retries))?;
        }
        if let Some(delay) = get("OPENAI_BASE_DELAY") {
            self.embedding.base_delay_ms = seconds_to_millis("OPENAI_BASE_DELAY", &delay)?;
        }
        if let Some(delay) = get("OPENAI_BATCH_DELAY") {
            self.embedding.batch_delay_ms = seconds_to_millis("OPENAI_BATCH_DELAY", &delay)?;
        }

        if let Some(host) = get("QDRANT_HOST") {
            self.qdrant.url = if host.contains("://") {
                host
            } else {
                format!("http://{}:6333", host.trim())
            };
        }
        if let Some(port) = get("QDRANT_PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| invalid_env("QDRANT_PORT", &port))?;
            let mut url =
                Url::parse(&self.qdrant.url).map_err(|_| ConfigError::InvalidUrl(self.qdrant.url.clone()))?;
            url.set_port(Some(port))
                .map_err(|()| ConfigError::InvalidPort(port.to_string()))?;
            self.qdrant.url = url.as_str().trim_end_matches('/').to_string();
        }
        if let Some(key) = get("QDRANT_API_KEY") {
            self.qdrant.api_key = Some(key);
        }
        if let Some(collection) = get("COLLECTION_NAME") {
            self.qdrant.collection = collection;
        }

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.qdrant.validate()?;
        self.validate_chunking_config()?;
        self.pipeline.validate()?;
        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if config.target_size == 0 {
            return Err(ConfigError::InvalidTargetChunkSize(config.target_size));
        }

        if config.overlap >= config.target_size {
            return Err(ConfigError::OverlapTooLarge(
                config.overlap,
                config.target_size,
            ));
        }

        if config.min_size >= config.target_size {
            return Err(ConfigError::MinChunkSizeTooLarge(
                config.min_size,
                config.target_size,
            ));
        }

        Ok(())
    }

    /// The Qdrant base URL, parsed
    #[inline]
    pub fn qdrant_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.qdrant.url).map_err(|_| ConfigError::InvalidUrl(self.qdrant.url.clone()))
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // The endpoint may come from the environment at run time
        if !self.endpoint.trim().is_empty() {
            validate_http_url(&self.endpoint)?;
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(64..=4096).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        if !(1..=20).contains(&self.max_retries) {
            return Err(ConfigError::InvalidRetryCount(self.max_retries));
        }

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.endpoint.trim().is_empty()
    }
}

impl QdrantConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url(&self.url)?;

        if self.collection.trim().is_empty() {
            return Err(ConfigError::InvalidCollection(self.collection.clone()));
        }

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        Ok(())
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.save_interval == 0 {
            return Err(ConfigError::InvalidSaveInterval(self.save_interval));
        }

        if self.version.trim().is_empty() {
            return Err(ConfigError::InvalidVersion(self.version.clone()));
        }

        Ok(())
    }
}

fn validate_http_url(raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidProtocol(other.to_string())),
    }
}

fn invalid_env(name: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvValue {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn seconds_to_millis(name: &str, value: &str) -> Result<u64, ConfigError> {
    let seconds: f64 = value
        .trim()
        .parse()
        .map_err(|_| invalid_env(name, value))?;
    let duration = std::time::Duration::try_from_secs_f64(seconds)
        .map_err(|_| invalid_env(name, value))?;
    u64::try_from(duration.as_millis()).map_err(|_| invalid_env(name, value))
}
