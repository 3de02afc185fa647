
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::{CollectionInfo, CollectionParams, Filter, Point, ScoredPoint, SearchParams, VectorStore};
use crate::config::QdrantConfig;
use crate::{DocsError, Result};

/// Qdrant client over the REST API
#[derive(Debug, Clone)]
pub struct QdrantStore {
    base_url: Url,
    api_key: Option<String>,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CollectionResult {
    status: Option<String>,
    points_count: Option<u64>,
    config: Option<CollectionConfigResult>,
}

#[derive(Debug, Deserialize)]
struct CollectionConfigResult {
    params: Option<CollectionParamsResult>,
}

#[derive(Debug, Deserialize)]
struct CollectionParamsResult {
    vectors: Option<Value>,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Filter>,
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    score_threshold: Option<f32>,
    with_payload: bool,
}

#[derive(Debug, Serialize)]
struct UpsertRequest {
    points: Vec<Point>,
}

impl QdrantStore {
    #[inline]
    pub fn new(config: &QdrantConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.url)
            .with_context(|| format!("Invalid Qdrant URL: {}", config.url))?;
        anyhow::ensure!(
            matches!(base_url.scheme(), "http" | "https"),
            "Qdrant URL must be http(s): {}",
            config.url
        );

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key: config
                .api_key
                .as_ref()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            agent,
        })
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Check that the server answers on `/collections`
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        let url = self.endpoint(&["collections"], &[])?;
        let request = self.authorize(self.agent.get(url.as_str()));
        let (status, body) = read_response(request.call(), "health check")?;
        if !(200..300).contains(&status) {
            return Err(store_error("health check", status, &body));
        }
        info!("Qdrant at {} is reachable", self.base_url);
        Ok(())
    }

    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| DocsError::Store(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn authorize<B>(&self, request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        match &self.api_key {
            Some(key) => request.header("api-key", key.as_str()),
            None => request,
        }
    }

    fn send_json(
        &self,
        request: ureq::RequestBuilder<ureq::typestate::WithBody>,
        body: &impl Serialize,
        what: &str,
    ) -> Result<String> {
        let body = serde_json::to_string(body)?;
        let request = self
            .authorize(request)
            .header("Content-Type", "application/json");
        let (status, text) = read_response(request.send(&body), what)?;
        if !(200..300).contains(&status) {
            return Err(store_error(what, status, &text));
        }
        Ok(text)
    }
}

impl VectorStore for QdrantStore {
    #[inline]
    fn try_get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let url = self.endpoint(&["collections", name], &[])?;
        let request = self.authorize(self.agent.get(url.as_str()));
        let (status, body) = read_response(request.call(), "collection lookup")?;

        match status {
            404 => {
                debug!("Collection '{}' does not exist", name);
                Ok(None)
            }
            200..=299 => parse_collection_info(name, &body).map(Some),
            _ => Err(store_error("collection lookup", status, &body)),
        }
    }

    #[inline]
    fn create_collection(&self, name: &str, params: &CollectionParams) -> Result<()> {
        let url = self.endpoint(&["collections", name], &[])?;
        let body = collection_body(params);
        self.send_json(self.agent.put(url.as_str()), &body, "collection creation")?;
        info!(
            "Created collection '{}' ({} dimensions, {:?})",
            name, params.vector_size, params.distance
        );
        Ok(())
    }

    #[inline]
    fn upsert(&self, name: &str, points: Vec<Point>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let count = points.len();
        let url = self.endpoint(&["collections", name, "points"], &[("wait", "true")])?;
        self.send_json(
            self.agent.put(url.as_str()),
            &UpsertRequest { points },
            "upsert",
        )?;
        debug!("Upserted {} points into '{}'", count, name);
        Ok(())
    }

    #[inline]
    fn search(&self, name: &str, params: &SearchParams) -> Result<Vec<ScoredPoint>> {
        let url = self.endpoint(&["collections", name, "points", "search"], &[])?;
        let request = SearchRequest {
            vector: &params.vector,
            filter: params.filter.as_ref(),
            limit: params.limit,
            score_threshold: params.score_threshold,
            with_payload: true,
        };
        let text = self.send_json(self.agent.post(url.as_str()), &request, "search")?;
        let response: QdrantResponse<Vec<ScoredPoint>> = serde_json::from_str(&text)?;
        Ok(response.result)
    }
}

fn collection_body(params: &CollectionParams) -> Value {
    json!({
        "vectors": {
            "size": params.vector_size,
            "distance": params.distance,
        },
        "hnsw_config": params.hnsw,
    })
}

fn parse_collection_info(name: &str, body: &str) -> Result<CollectionInfo> {
    let response: QdrantResponse<CollectionResult> = serde_json::from_str(body)?;
    let result = response.result;

    let vector_size = result
        .config
        .and_then(|config| config.params)
        .and_then(|params| params.vectors)
        .and_then(|vectors| vectors.get("size").and_then(Value::as_u64))
        .and_then(|size| usize::try_from(size).ok());

    Ok(CollectionInfo {
        name: name.to_string(),
        points_count: result.points_count,
        vector_size,
        status: result.status,
    })
}

fn read_response(
    result: std::result::Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    what: &str,
) -> Result<(u16, String)> {
    let mut response =
        result.map_err(|e| DocsError::Store(format!("Qdrant {} request failed: {}", what, e)))?;
    let status = response.status().as_u16();
    let body = response.body_mut().read_to_string().map_err(|e| {
        DocsError::Store(format!("Failed to read Qdrant {} response: {}", what, e))
    })?;
    Ok((status, body))
}

fn store_error(what: &str, status: u16, body: &str) -> DocsError {
    DocsError::Store(format!(
        "Qdrant {} failed with HTTP {}: {}",
        what,
        status,
        body.trim()
    ))
}
