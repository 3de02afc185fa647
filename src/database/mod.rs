// Database module
// Vector store abstraction with a Qdrant REST backend and an in-memory backend

pub mod memory;
pub mod qdrant;


use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::extractor::Chunk;
use crate::{DocsError, Result};

pub use memory::MemoryStore;
pub use qdrant::QdrantStore;

pub type Payload = Map<String, Value>;

/// Summary of an existing collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub points_count: Option<u64>,
    pub vector_size: Option<usize>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    Cosine,
    Dot,
    Euclid,
}

/// HNSW index parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswConfig {
    pub m: usize,
    pub ef_construct: usize,
    pub full_scan_threshold: usize,
}

impl Default for HnswConfig {
    #[inline]
    fn default() -> Self {
        Self {
            m: 16,
            ef_construct: 200,
            full_scan_threshold: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionParams {
    pub vector_size: usize,
    pub distance: Distance,
    pub hnsw: HnswConfig,
}

impl CollectionParams {
    /// Cosine collection with the default index parameters
    #[inline]
    pub fn cosine(vector_size: usize) -> Self {
        Self {
            vector_size,
            distance: Distance::Cosine,
            hnsw: HnswConfig::default(),
        }
    }
}

/// A vector with its id and payload, as written to the store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

/// A search hit as returned by the store
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoredPoint {
    pub id: Value,
    pub score: f32,
    #[serde(default)]
    pub payload: Payload,
}

/// Payload filter; all conditions must hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Filter {
    pub must: Vec<FieldCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldCondition {
    pub key: String,
    #[serde(rename = "match")]
    pub match_value: MatchValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchValue {
    pub value: String,
}

impl Filter {
    /// Exact match on the `version` payload key
    #[inline]
    pub fn version(version: &str) -> Self {
        Self {
            must: vec![FieldCondition {
                key: "version".to_string(),
                match_value: MatchValue {
                    value: version.to_string(),
                },
            }],
        }
    }

    /// Whether `payload` satisfies every condition
    #[inline]
    pub fn matches(&self, payload: &Payload) -> bool {
        self.must.iter().all(|condition| {
            payload
                .get(&condition.key)
                .and_then(Value::as_str)
                .is_some_and(|value| value == condition.match_value.value)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub vector: Vec<f32>,
    pub filter: Option<Filter>,
    pub limit: usize,
    /// Minimum raw similarity
    pub score_threshold: Option<f32>,
}

/// Similarity-search vector store.
///
/// Implementations are blocking; async callers should go through
/// `tokio::task::spawn_blocking`.
pub trait VectorStore: Send + Sync {
    /// Look up a collection; `None` when it does not exist
    fn try_get_collection(&self, name: &str) -> Result<Option<CollectionInfo>>;

    fn create_collection(&self, name: &str, params: &CollectionParams) -> Result<()>;

    /// Insert or replace points by id
    fn upsert(&self, name: &str, points: Vec<Point>) -> Result<()>;

    /// Nearest points, best first, payloads included
    fn search(&self, name: &str, params: &SearchParams) -> Result<Vec<ScoredPoint>>;
}

/// Pair chunks with their embeddings and upsert them as one batch.
///
/// Returns the number of points written.
#[inline]
pub fn store_chunks(
    store: &dyn VectorStore,
    collection: &str,
    chunks: &[Chunk],
    embeddings: Vec<Vec<f32>>,
) -> Result<usize> {
    if chunks.len() != embeddings.len() {
        return Err(DocsError::Validation(format!(
            "mismatch between chunks ({}) and embeddings ({})",
            chunks.len(),
            embeddings.len()
        )));
    }

    if chunks.is_empty() {
        return Ok(0);
    }

    let points = chunks
        .iter()
        .zip(embeddings)
        .map(|(chunk, vector)| {
            Ok(Point {
                id: chunk.id,
                vector,
                payload: chunk.payload()?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let count = points.len();
    store.upsert(collection, points)?;
    debug!("Stored {} chunks in collection '{}'", count, collection);

    Ok(count)
}
