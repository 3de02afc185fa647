// Ranking engine
// Similarity search with metadata boosting and graceful fallbacks


use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::Result;
use crate::database::{Filter, Payload, ScoredPoint, SearchParams, VectorStore};
use crate::embeddings::Embedder;

pub const DEFAULT_LIMIT: usize = 5;
pub const DEFAULT_MIN_SCORE: f64 = 0.4;

/// Upper bound on first-phase candidates
const MAX_CANDIDATES: usize = 30;
/// First-phase threshold is `min_score - margin`, floored at this value
const CANDIDATE_THRESHOLD_FLOOR: f64 = 0.2;
const CANDIDATE_THRESHOLD_MARGIN: f64 = 0.1;
const FALLBACK_THRESHOLD: f32 = 0.1;
const FALLBACK_LIMIT: usize = 5;

const GUIDE_CONTENT_TYPES: &[&str] = &["tutorial", "guide", "example"];
const IMPLEMENTATION_TERMS: &[&str] = &[
    "how to",
    "example",
    "implement",
    "create",
    "build",
    "code",
    "method",
];
const UI_QUERY_TERMS: &[&str] = &[
    "ui",
    "menu",
    "screen",
    "overlay",
    "widget",
    "button",
    "navigation",
];
const UI_CONTENT_TERMS: &[&str] = &["overlay", "widget", "menu", "screen", "ui"];

const CONTENT_TYPE_BOOST: f64 = 0.1;
const TITLE_TERM_BOOST: f64 = 0.15;
const HEADING_TERM_BOOST: f64 = 0.1;
const CODE_BOOST: f64 = 0.1;
const UI_BOOST: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Exact documentation version to restrict results to
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_min_score() -> f64 {
    DEFAULT_MIN_SCORE
}

impl SearchRequest {
    #[inline]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            version: None,
            limit: DEFAULT_LIMIT,
            min_score: DEFAULT_MIN_SCORE,
        }
    }

    #[inline]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// The version filter, ignoring blank versions
    fn version(&self) -> Option<&str> {
        self.version
            .as_deref()
            .map(str::trim)
            .filter(|version| !version.is_empty())
    }
}

/// One result record, as returned to MCP clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    pub title: String,
    pub file_path: String,
    pub section: String,
    pub doc_url: String,
    pub heading_path: Vec<String>,
    pub has_code: bool,
    pub content_type: String,
    pub version: String,
    /// Boosted score for ranked results, raw score for fallback results
    pub similarity_score: f64,
}

impl SearchHit {
    /// Build a record from a stored payload; missing fields become empty
    #[inline]
    pub fn from_payload(payload: &Payload, score: f64) -> Self {
        Self {
            content: str_field(payload, "content").to_string(),
            title: str_field(payload, "title").to_string(),
            file_path: str_field(payload, "file_path").to_string(),
            section: str_field(payload, "section").to_string(),
            doc_url: str_field(payload, "doc_url").to_string(),
            heading_path: heading_path(payload),
            has_code: payload
                .get("has_code")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            content_type: str_field(payload, "content_type").to_string(),
            version: str_field(payload, "version").to_string(),
            similarity_score: round_score(score),
        }
    }

    /// Placeholder returned when nothing matched
    #[inline]
    pub fn no_results(query: &str, version: Option<&str>) -> Self {
        Self::system_record(
            format!(
                "No relevant documentation found for query: '{}'. Try using different terms or check if the documentation has been processed.",
                query
            ),
            "No Results",
            "search",
            "system",
            version,
        )
    }

    /// Placeholder returned when the search itself failed
    #[inline]
    pub fn search_error(message: &str, version: Option<&str>) -> Self {
        Self::system_record(
            format!("Error searching knowledge base: {}", message),
            "Search Error",
            "error",
            "error",
            version,
        )
    }

    fn system_record(
        content: String,
        title: &str,
        section: &str,
        content_type: &str,
        version: Option<&str>,
    ) -> Self {
        Self {
            content,
            title: title.to_string(),
            file_path: String::new(),
            section: section.to_string(),
            doc_url: String::new(),
            heading_path: Vec::new(),
            has_code: false,
            content_type: content_type.to_string(),
            version: version.unwrap_or("unknown").to_string(),
            similarity_score: 0.0,
        }
    }
}

/// Multiplier applied to a candidate's raw similarity
#[inline]
pub fn compute_boost(query: &str, payload: &Payload) -> f64 {
    let query_lower = query.to_lowercase();
    let mut boost = 1.0;

    let content_type = str_field(payload, "content_type").to_lowercase();
    if GUIDE_CONTENT_TYPES
        .iter()
        .any(|term| content_type.contains(term))
    {
        boost += CONTENT_TYPE_BOOST;
    }

    let title = str_field(payload, "title").to_lowercase();
    let headings = heading_path(payload).join(" ").to_lowercase();
    for term in query_lower.split_whitespace() {
        if title.contains(term) {
            boost += TITLE_TERM_BOOST;
        }
        if headings.contains(term) {
            boost += HEADING_TERM_BOOST;
        }
    }

    let has_code = payload
        .get("has_code")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if has_code
        && IMPLEMENTATION_TERMS
            .iter()
            .any(|term| query_lower.contains(term))
    {
        boost += CODE_BOOST;
    }

    if UI_QUERY_TERMS.iter().any(|term| query_lower.contains(term)) {
        let content = str_field(payload, "content").to_lowercase();
        if UI_CONTENT_TERMS.iter().any(|term| content.contains(term)) {
            boost += UI_BOOST;
        }
    }

    boost
}

/// Boost, threshold, order and truncate first-phase candidates
#[inline]
pub fn rank_candidates(
    query: &str,
    candidates: &[ScoredPoint],
    min_score: f64,
    limit: usize,
) -> Vec<SearchHit> {
    let mut boosted: Vec<(f64, &ScoredPoint)> = candidates
        .iter()
        .map(|candidate| {
            (
                f64::from(candidate.score) * compute_boost(query, &candidate.payload),
                candidate,
            )
        })
        .filter(|(score, _)| *score >= min_score)
        .collect();

    // Stable, so equal scores keep store order
    boosted.sort_by(|a, b| b.0.total_cmp(&a.0));
    boosted.truncate(limit);

    boosted
        .into_iter()
        .map(|(score, candidate)| SearchHit::from_payload(&candidate.payload, score))
        .collect()
}

/// Query-side search over one collection
pub struct SearchEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl SearchEngine {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            collection: collection.into(),
        }
    }

    #[inline]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Run the ranked search. Never returns an empty list on success.
    #[inline]
    pub fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        info!("Searching Flame knowledge base for: '{}'", request.query);

        let vector = self.embedder.embed_query(&request.query)?;
        let filter = request.version().map(Filter::version);
        let limit = request.limit.max(1);

        let candidates = self.store.search(
            &self.collection,
            &SearchParams {
                vector: vector.clone(),
                filter: filter.clone(),
                limit: limit.saturating_mul(2).min(MAX_CANDIDATES),
                score_threshold: Some(
                    (request.min_score - CANDIDATE_THRESHOLD_MARGIN).max(CANDIDATE_THRESHOLD_FLOOR)
                        as f32,
                ),
            },
        )?;

        let results = rank_candidates(&request.query, &candidates, request.min_score, limit);
        info!(
            "Found {} relevant chunks for query: '{}' (from {} initial results)",
            results.len(),
            request.query,
            candidates.len()
        );
        if !results.is_empty() {
            return Ok(results);
        }

        debug!(
            "No results with current threshold, trying broader search for: '{}'",
            request.query
        );
        let broader = self.store.search(
            &self.collection,
            &SearchParams {
                vector,
                filter,
                limit: FALLBACK_LIMIT,
                score_threshold: Some(FALLBACK_THRESHOLD),
            },
        )?;
        if !broader.is_empty() {
            info!("Broader search found {} results", broader.len());
            return Ok(broader
                .iter()
                .map(|hit| SearchHit::from_payload(&hit.payload, f64::from(hit.score)))
                .collect());
        }

        Ok(vec![SearchHit::no_results(
            &request.query,
            request.version(),
        )])
    }

    /// Like [`SearchEngine::search`], but failures become a single error record
    #[inline]
    pub fn search_or_report(&self, request: &SearchRequest) -> Vec<SearchHit> {
        match self.search(request) {
            Ok(hits) => hits,
            Err(e) => {
                error!("Error searching knowledge base: {}", e);
                vec![SearchHit::search_error(&e.to_string(), request.version())]
            }
        }
    }
}

fn str_field<'a>(payload: &'a Payload, key: &str) -> &'a str {
    payload.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn heading_path(payload: &Payload) -> Vec<String> {
    payload
        .get("heading_path")
        .and_then(Value::as_array)
        .map(|headings| {
            headings
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn round_score(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}
