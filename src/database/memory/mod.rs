
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;
use uuid::Uuid;

use super::{CollectionInfo, CollectionParams, Point, ScoredPoint, SearchParams, VectorStore};
use crate::{DocsError, Result};

struct MemoryCollection {
    params: CollectionParams,
    points: HashMap<Uuid, Point>,
}

/// In-memory vector store with brute-force cosine search.
///
/// Used by tests and for dry runs without a Qdrant server.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl MemoryStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points in a collection, `None` if it does not exist
    #[inline]
    pub fn point_count(&self, name: &str) -> Option<usize> {
        self.read()
            .ok()?
            .get(name)
            .map(|collection| collection.points.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, MemoryCollection>>> {
        self.collections
            .read()
            .map_err(|_| DocsError::Store("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, MemoryCollection>>> {
        self.collections
            .write()
            .map_err(|_| DocsError::Store("memory store lock poisoned".to_string()))
    }
}

impl VectorStore for MemoryStore {
    #[inline]
    fn try_get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        Ok(self.read()?.get(name).map(|collection| CollectionInfo {
            name: name.to_string(),
            points_count: Some(collection.points.len() as u64),
            vector_size: Some(collection.params.vector_size),
            status: Some("green".to_string()),
        }))
    }

    #[inline]
    fn create_collection(&self, name: &str, params: &CollectionParams) -> Result<()> {
        let mut collections = self.write()?;
        if collections.contains_key(name) {
            return Err(DocsError::Store(format!(
                "collection '{}' already exists",
                name
            )));
        }

        collections.insert(
            name.to_string(),
            MemoryCollection {
                params: *params,
                points: HashMap::new(),
            },
        );
        debug!(
            "Created in-memory collection '{}' ({} dimensions)",
            name, params.vector_size
        );
        Ok(())
    }

    #[inline]
    fn upsert(&self, name: &str, points: Vec<Point>) -> Result<()> {
        let mut collections = self.write()?;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| DocsError::Store(format!("collection '{}' not found", name)))?;

        if let Some(bad) = points
            .iter()
            .find(|point| point.vector.len() != collection.params.vector_size)
        {
            return Err(DocsError::Store(format!(
                "wrong vector size for point {}: expected {}, got {}",
                bad.id,
                collection.params.vector_size,
                bad.vector.len()
            )));
        }

        for point in points {
            collection.points.insert(point.id, point);
        }
        Ok(())
    }

    #[inline]
    fn search(&self, name: &str, params: &SearchParams) -> Result<Vec<ScoredPoint>> {
        let collections = self.read()?;
        let collection = collections
            .get(name)
            .ok_or_else(|| DocsError::Store(format!("collection '{}' not found", name)))?;

        let mut hits: Vec<ScoredPoint> = collection
            .points
            .values()
            .filter(|point| {
                params
                    .filter
                    .as_ref()
                    .is_none_or(|filter| filter.matches(&point.payload))
            })
            .map(|point| ScoredPoint {
                id: serde_json::Value::String(point.id.to_string()),
                score: cosine_sim(&params.vector, &point.vector),
                payload: point.payload.clone(),
            })
            .filter(|hit| params.score_threshold.is_none_or(|min| hit.score >= min))
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(params.limit);
        Ok(hits)
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}
