//! Embedding provider trait and the remote HTTP implementation.

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use docdex_chunk::Tokenizer;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::time::Duration;

/// Trait for services that turn text into a fixed-dimension vector.
///
/// Implementations are expected to be pure for a fixed [`model_id`]: the
/// same input must always yield the same vector, which is what makes the
/// content-addressed embedding cache sound.
///
/// [`model_id`]: EmbeddingProvider::model_id
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text. Long input is truncated, not rejected.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimension of the vectors this provider produces.
    fn dimension(&self) -> usize;

    /// Identity of the underlying model/deployment, folded into cache
    /// fingerprints.
    fn model_id(&self) -> &str;
}

/// Remote embedding provider speaking the deployment-style embeddings REST
/// API (`POST {endpoint}/openai/deployments/{deployment}/embeddings`).
///
/// Every call applies deterministic token truncation first, then runs
/// under the shared [`RetryPolicy`]: HTTP 429 honors the server's
/// `retry-after` hint, 5xx and transport failures back off exponentially,
/// and other 4xx responses fail the chunk without retrying.
pub struct HttpEmbeddingProvider {
    config: EmbedConfig,
    client: reqwest::Client,
    retry: RetryPolicy,
    tokenizer: Tokenizer,
}

impl std::fmt::Debug for HttpEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbeddingProvider")
            .field("endpoint", &self.config.endpoint)
            .field("deployment", &self.config.deployment)
            .field("dimension", &self.config.dimension)
            .finish()
    }
}

impl HttpEmbeddingProvider {
    pub fn new(config: EmbedConfig, retry: RetryPolicy) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbedError::config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            config,
            client,
            retry,
            tokenizer: Tokenizer::new(),
        })
    }

    fn request_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.deployment,
            self.config.api_version
        )
    }

    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(self.request_url())
            .header("api-key", &self.config.api_key)
            .json(&serde_json::json!({ "input": text }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let json: serde_json::Value = response.json().await?;
            let vector = parse_embedding_response(&json)?;
            if self.config.dimension != 0 && vector.len() != self.config.dimension {
                return Err(EmbedError::protocol(format!(
                    "expected dimension {}, got {}",
                    self.config.dimension,
                    vector.len()
                )));
            }
            return Ok(vector);
        }

        let hint = retry_after_hint(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, hint, &body))
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let truncated = self
            .tokenizer
            .truncate_to_tokens(text, self.config.max_input_tokens);
        if truncated.len() < text.len() {
            tracing::debug!(
                "truncated embedding input from {} to {} bytes",
                text.len(),
                truncated.len()
            );
        }

        self.retry.run(|_attempt| self.request_embedding(truncated)).await
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_id(&self) -> &str {
        &self.config.model_id
    }
}

/// Map an error response status to the embed error taxonomy.
fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> EmbedError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => EmbedError::RateLimited { retry_after },
        StatusCode::REQUEST_TIMEOUT => EmbedError::transient(format!("http {status}: {body}")),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            EmbedError::config(format!("authentication failed (http {status})"))
        }
        s if s.is_server_error() => EmbedError::transient(format!("http {status}: {body}")),
        _ => EmbedError::invalid_input(format!("http {status}: {body}")),
    }
}

/// Parse a `retry-after` header given in whole seconds.
fn retry_after_hint(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Extract the first embedding vector from an embeddings API response.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbedError::protocol("missing data array"))?;
    let first = data
        .first()
        .ok_or_else(|| EmbedError::protocol("empty data array"))?;
    let embedding = first
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbedError::protocol("missing embedding field"))?;

    embedding
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| EmbedError::protocol("non-numeric embedding component"))
        })
        .collect()
}
