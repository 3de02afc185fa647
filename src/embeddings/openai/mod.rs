
use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::EmbeddingConfig;
use crate::embeddings::{EmbedError, Embedder};

pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// Upper bound of the random jitter added to each retry delay
const MAX_JITTER_SECONDS: f64 = 2.0;

/// Which flavour of the OpenAI embeddings API to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Azure OpenAI deployment (`api-key` header, `api-version` query)
    #[default]
    Azure,
    /// api.openai.com or a compatible server (bearer token)
    #[serde(rename = "openai")]
    OpenAi,
}

impl std::fmt::Display for EmbeddingProvider {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Azure => write!(f, "azure"),
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

/// Retry and pacing policy for embedding requests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Pause before a multi-text request
    pub batch_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt `attempt` (0-based):
    /// `base_delay * 2^attempt` plus up to two seconds of jitter
    #[inline]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        let jitter = rand::thread_rng().gen_range(0.0..MAX_JITTER_SECONDS);
        exponential + Duration::from_secs_f64(jitter)
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    endpoint: Url,
    provider: EmbeddingProvider,
    api_key: String,
    model: String,
    dimension: usize,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbedder {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        anyhow::ensure!(
            !config.api_key.trim().is_empty(),
            "missing embedding API key (set OPENAI_API_KEY)"
        );
        anyhow::ensure!(
            !config.endpoint.trim().is_empty(),
            "missing embedding endpoint (set OPENAI_API_BASE)"
        );

        let endpoint = embeddings_url(config).context("Failed to build embeddings URL")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            endpoint,
            provider: config.provider,
            api_key: config.api_key.trim().to_string(),
            model: config.model.clone(),
            dimension: config.dimension,
            agent,
            retry: RetryPolicy {
                max_retries: config.max_retries.max(1),
                base_delay: Duration::from_millis(config.base_delay_ms),
                batch_delay: Duration::from_millis(config.batch_delay_ms),
            },
        })
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Embed a probe string and verify the returned dimension
    #[inline]
    pub fn health_check(&self) -> Result<(), EmbedError> {
        debug!("Performing embedding health check against {}", self.endpoint);
        let vector = self.embed_query("health check")?;
        info!(
            "Embedding service at {} returned a {}-dimensional vector",
            self.endpoint,
            vector.len()
        );
        Ok(())
    }

    fn send(&self, body: &str, expected: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
        let request = self
            .agent
            .post(self.endpoint.as_str())
            .header("Content-Type", "application/json");
        let request = match self.provider {
            EmbeddingProvider::Azure => request.header("api-key", self.api_key.as_str()),
            EmbeddingProvider::OpenAi => {
                request.header("Authorization", format!("Bearer {}", self.api_key))
            }
        };

        let mut response = request.send(body).map_err(|e| {
            let message = format!("request to {} failed: {}", self.endpoint, e);
            if looks_rate_limited(&message) {
                EmbedError::RateLimited(message)
            } else {
                EmbedError::Transient(message)
            }
        })?;

        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| EmbedError::Transient(format!("failed to read response body: {}", e)))?;

        if let Some(err) = classify_status(status, &text) {
            return Err(err);
        }

        parse_embeddings(&text, expected, self.dimension)
    }
}

impl Embedder for OpenAiEmbedder {
    #[inline]
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::to_string(&EmbeddingRequest {
            input: texts,
            model: &self.model,
        })
        .map_err(|e| EmbedError::Fatal(format!("failed to serialize request: {}", e)))?;

        let mut attempt = 0;
        loop {
            if attempt == 0 && texts.len() > 1 && !self.retry.batch_delay.is_zero() {
                std::thread::sleep(self.retry.batch_delay);
            }

            match self.send(&body, texts.len()) {
                Ok(vectors) => {
                    debug!("Created {} embeddings", vectors.len());
                    return Ok(vectors);
                }
                Err(err) if err.is_rate_limited() && attempt + 1 < self.retry.max_retries => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "Rate limit hit, waiting {:.2}s before retry {}/{}",
                        delay.as_secs_f64(),
                        attempt + 1,
                        self.retry.max_retries
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_rate_limited() {
                        error!(
                            "Rate limit exceeded after {} attempts",
                            self.retry.max_retries
                        );
                    } else {
                        error!("Error creating embeddings: {}", err);
                    }
                    return Err(err);
                }
            }
        }
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Build the embeddings endpoint for the configured provider
fn embeddings_url(config: &EmbeddingConfig) -> Result<Url> {
    let base = config.endpoint.trim_end_matches('/');
    match config.provider {
        EmbeddingProvider::Azure => {
            let mut url = Url::parse(&format!(
                "{}/openai/deployments/{}/embeddings",
                base, config.model
            ))?;
            url.query_pairs_mut()
                .append_pair("api-version", &config.api_version);
            Ok(url)
        }
        EmbeddingProvider::OpenAi => Ok(Url::parse(&format!("{}/embeddings", base))?),
    }
}

/// Map a non-success HTTP status to an error kind
fn classify_status(status: u16, body: &str) -> Option<EmbedError> {
    let message = format!("HTTP {}: {}", status, body.trim());
    match status {
        200..=299 => None,
        429 => Some(EmbedError::RateLimited(message)),
        // Some gateways report throttling with other status codes
        _ if looks_rate_limited(body) => Some(EmbedError::RateLimited(message)),
        500..=599 => Some(EmbedError::Transient(message)),
        _ => Some(EmbedError::Fatal(message)),
    }
}

/// Throttling wording only; bare status digits also show up in request ids
fn looks_rate_limited(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("rate limit") || lower.contains("too many requests")
}

fn parse_embeddings(
    body: &str,
    expected: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let mut response: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| EmbedError::Fatal(format!("failed to parse embedding response: {}", e)))?;

    response.data.sort_by_key(|entry| entry.index);

    if response.data.len() != expected {
        return Err(EmbedError::Fatal(format!(
            "service returned {} embeddings for {} inputs",
            response.data.len(),
            expected
        )));
    }

    if let Some(bad) = response
        .data
        .iter()
        .find(|entry| entry.embedding.len() != dimension)
    {
        return Err(EmbedError::Fatal(format!(
            "expected {}-dimensional embeddings, got {}",
            dimension,
            bad.embedding.len()
        )));
    }

    Ok(response
        .data
        .into_iter()
        .map(|entry| entry.embedding)
        .collect())
}
