// Embeddings module
// Tokenization, chunking and the embedding service client

pub mod chunking;
pub mod openai;
pub mod tokenizer;

use thiserror::Error;

pub use chunking::{ChunkingConfig, TextChunk, chunk_document};
pub use openai::OpenAiEmbedder;
pub use tokenizer::{Cl100kTokenizer, Tokenizer, WhitespaceTokenizer};

/// Failure of an embedding request, classified by whether a retry can help
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbedError {
    /// The service throttled us (HTTP 429); safe to retry after a backoff
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Server-side or transport failure; surfaced to the caller without retry
    #[error("transient API error: {0}")]
    Transient(String),
    /// Request rejected or response unusable
    #[error("API error: {0}")]
    Fatal(String),
}

impl EmbedError {
    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Text to vector service. Output order matches input order.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Dimension of the vectors this embedder produces
    fn dimension(&self) -> usize;

    /// Embed a single query string
    #[inline]
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Fatal("embedding service returned no vectors".to_string()))
    }
}
