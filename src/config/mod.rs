// Configuration management module
// TOML settings with environment overrides, and a printable summary

pub mod display;
pub mod settings;

pub use display::{mask_secret, show_config};
pub use settings::{Config, ConfigError, EmbeddingConfig, PipelineConfig, QdrantConfig};
