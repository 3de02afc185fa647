use thiserror::Error;

use crate::embeddings::EmbedError;

pub type Result<T> = std::result::Result<T, DocsError>;

#[derive(Error, Debug)]
pub enum DocsError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbedError),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod extractor;
pub mod indexer;
pub mod mcp;
pub mod search;
