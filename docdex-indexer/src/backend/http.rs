//! HTTP implementation of the search backend contract.
//!
//! Speaks the index-service REST API: batched upserts via
//! `POST {endpoint}/indexes/{index}/docs/index` and queries via
//! `POST {endpoint}/indexes/{index}/docs/search`, authenticated with an
//! `api-key` header. The service fuses keyword and vector legs natively
//! and exposes semantic reranking as a query type, so
//! [`supports_native_hybrid`](super::SearchBackend::supports_native_hybrid)
//! is true here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::{BackendError, IndexDocument, SearchBackend, SearchHit, SearchRequest, UploadOutcome};

/// Default API version query parameter.
pub const DEFAULT_API_VERSION: &str = "2023-11-01";

/// Connection settings for the remote search index.
#[derive(Debug, Clone)]
pub struct SearchBackendConfig {
    /// Service base URL, e.g. `https://my-service.search.windows.net`.
    pub endpoint: String,
    /// API key sent in the `api-key` header.
    pub api_key: String,
    /// Target index name.
    pub index: String,
    /// API version query parameter.
    pub api_version: String,
    /// Semantic configuration name used for reranking queries.
    pub semantic_configuration: String,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl SearchBackendConfig {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        index: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            index: index.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            semantic_configuration: "semantic-config".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn validate(&self) -> Result<(), BackendError> {
        if self.endpoint.trim().is_empty() {
            return Err(BackendError::config("search endpoint is empty"));
        }
        if self.api_key.trim().is_empty() {
            return Err(BackendError::config("search api key is empty"));
        }
        if self.index.trim().is_empty() {
            return Err(BackendError::config("search index name is empty"));
        }
        Ok(())
    }
}

/// Remote search index client.
pub struct HttpSearchBackend {
    config: SearchBackendConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpSearchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSearchBackend")
            .field("endpoint", &self.config.endpoint)
            .field("index", &self.config.index)
            .finish()
    }
}

impl HttpSearchBackend {
    pub fn new(config: SearchBackendConfig) -> Result<Self, BackendError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::config(format!("failed to build http client: {e}")))?;
        Ok(Self { config, client })
    }

    fn docs_url(&self, operation: &str) -> String {
        format!(
            "{}/indexes/{}/docs/{}?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.index,
            operation,
            self.config.api_version
        )
    }

    async fn post_actions(
        &self,
        actions: Vec<serde_json::Value>,
    ) -> Result<Vec<UploadOutcome>, BackendError> {
        let response = self
            .client
            .post(self.docs_url("index"))
            .header("api-key", &self.config.api_key)
            .json(&serde_json::json!({ "value": actions }))
            .send()
            .await?;

        let status = response.status();
        // 207 signals per-document failures inside an accepted batch.
        if !status.is_success() && status != StatusCode::MULTI_STATUS {
            let hint = retry_after_hint(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, hint, &body));
        }

        let body: IndexBatchResponse = response.json().await?;
        Ok(body
            .value
            .into_iter()
            .map(|item| UploadOutcome {
                id: item.key,
                succeeded: item.status,
                error: item.error_message,
            })
            .collect())
    }

    fn search_body(&self, request: &SearchRequest, semantic: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "search": request.text.as_deref(),
            "top": request.top,
            "select": "id,name,filePath,chunkIndex,totalChunks,modifiedDateTime,content",
        });

        if let Some(vector) = &request.vector {
            body["vectorQueries"] = serde_json::json!([{
                "kind": "vector",
                "vector": vector,
                "fields": "contentVector",
                "k": request.vector_candidates.max(request.top),
            }]);
        }
        if let Some(filter) = &request.filter {
            body["filter"] = serde_json::json!(filter);
        }
        if semantic {
            body["queryType"] = serde_json::json!("semantic");
            body["semanticConfiguration"] =
                serde_json::json!(self.config.semantic_configuration);
        }
        body
    }

    async fn execute_search(
        &self,
        body: serde_json::Value,
    ) -> Result<Vec<SearchHit>, BackendError> {
        let response = self
            .client
            .post(self.docs_url("search"))
            .header("api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let hint = retry_after_hint(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, hint, &body));
        }

        let body: SearchResponse = response.json().await?;
        Ok(body.value.into_iter().map(RawHit::into_hit).collect())
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn upload(&self, documents: &[IndexDocument]) -> Result<Vec<UploadOutcome>, BackendError> {
        let actions = documents
            .iter()
            .map(|doc| {
                let mut value = serde_json::to_value(doc)
                    .map_err(|e| BackendError::protocol(e.to_string()))?;
                value["@search.action"] = serde_json::json!("mergeOrUpload");
                Ok(value)
            })
            .collect::<Result<Vec<_>, BackendError>>()?;

        self.post_actions(actions).await
    }

    async fn delete(&self, ids: &[String]) -> Result<(), BackendError> {
        if ids.is_empty() {
            return Ok(());
        }
        let actions = ids
            .iter()
            .map(|id| serde_json::json!({ "@search.action": "delete", "id": id }))
            .collect();
        self.post_actions(actions).await?;
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, BackendError> {
        self.execute_search(self.search_body(request, false)).await
    }

    async fn rerank(
        &self,
        query: &str,
        hits: &[SearchHit],
        top: usize,
    ) -> Result<Vec<SearchHit>, BackendError> {
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        // Re-issue a semantic query restricted to the candidate documents,
        // then carry the original scores over next to the reranker scores.
        let ids = hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>();
        let request = SearchRequest {
            text: Some(query.to_string()),
            vector: None,
            vector_candidates: 0,
            filter: Some(format!("search.in(id, '{}', ',')", ids.join(","))),
            top,
        };

        let original_scores: HashMap<&str, f64> =
            hits.iter().map(|h| (h.id.as_str(), h.score)).collect();

        let mut reranked = self.execute_search(self.search_body(&request, true)).await?;
        for hit in &mut reranked {
            if let Some(original) = original_scores.get(hit.id.as_str()) {
                hit.score = *original;
            }
        }
        Ok(reranked)
    }

    fn supports_native_hybrid(&self) -> bool {
        true
    }
}

#[derive(Debug, Deserialize)]
struct IndexBatchResponse {
    value: Vec<IndexBatchItem>,
}

#[derive(Debug, Deserialize)]
struct IndexBatchItem {
    key: String,
    status: bool,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    value: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "filePath", default)]
    path: String,
    #[serde(rename = "chunkIndex", default)]
    chunk_index: i64,
    #[serde(rename = "totalChunks", default)]
    total_chunks: i64,
    #[serde(rename = "modifiedDateTime", default)]
    modified: Option<DateTime<Utc>>,
    #[serde(default)]
    content: String,
    #[serde(rename = "@search.score", default)]
    score: f64,
    #[serde(rename = "@search.rerankerScore", default)]
    reranker_score: Option<f64>,
}

impl RawHit {
    fn into_hit(self) -> SearchHit {
        SearchHit {
            id: self.id,
            name: self.name,
            path: self.path,
            chunk_index: self.chunk_index,
            total_chunks: self.total_chunks,
            modified: self.modified,
            content: self.content,
            score: self.score,
            reranker_score: self.reranker_score,
        }
    }
}

fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> BackendError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => BackendError::RateLimited { retry_after },
        StatusCode::REQUEST_TIMEOUT => BackendError::transient(format!("http {status}: {body}")),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            BackendError::config(format!("authentication failed (http {status})"))
        }
        s if s.is_server_error() => BackendError::transient(format!("http {status}: {body}")),
        _ => BackendError::rejected(format!("http {status}: {body}")),
    }
}

fn retry_after_hint(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docdex_embed::Retryable;

    #[test]
    fn url_shapes() {
        let backend = HttpSearchBackend::new(SearchBackendConfig::new(
            "https://search.example.net/",
            "key",
            "documents",
        ))
        .unwrap();
        assert_eq!(
            backend.docs_url("index"),
            "https://search.example.net/indexes/documents/docs/index?api-version=2023-11-01"
        );
        assert_eq!(
            backend.docs_url("search"),
            "https://search.example.net/indexes/documents/docs/search?api-version=2023-11-01"
        );
    }

    #[test]
    fn search_body_includes_configured_pieces() {
        let backend = HttpSearchBackend::new(SearchBackendConfig::new(
            "https://search.example.net",
            "key",
            "documents",
        ))
        .unwrap();

        let request = SearchRequest {
            text: Some("quarterly report".into()),
            vector: Some(vec![0.1, 0.2]),
            vector_candidates: 50,
            filter: Some("extension eq '.docx'".into()),
            top: 5,
        };

        let body = backend.search_body(&request, true);
        assert_eq!(body["search"], "quarterly report");
        assert_eq!(body["top"], 5);
        assert_eq!(body["filter"], "extension eq '.docx'");
        assert_eq!(body["vectorQueries"][0]["k"], 50);
        assert_eq!(body["vectorQueries"][0]["fields"], "contentVector");
        assert_eq!(body["queryType"], "semantic");

        let keyword_only = backend.search_body(
            &SearchRequest {
                text: Some("q".into()),
                top: 10,
                ..Default::default()
            },
            false,
        );
        assert!(keyword_only.get("vectorQueries").is_none());
        assert!(keyword_only.get("queryType").is_none());
    }

    #[test]
    fn batch_response_parsing() {
        let json = r#"{
            "value": [
                { "key": "a", "status": true, "errorMessage": null, "statusCode": 201 },
                { "key": "b", "status": false, "errorMessage": "too large", "statusCode": 422 }
            ]
        }"#;
        let parsed: IndexBatchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.value.len(), 2);
        assert!(parsed.value[0].status);
        assert_eq!(parsed.value[1].error_message.as_deref(), Some("too large"));
    }

    #[test]
    fn hit_parsing_with_scores() {
        let json = r#"{
            "value": [{
                "@search.score": 1.25,
                "@search.rerankerScore": 2.5,
                "id": "abc",
                "name": "report.docx",
                "filePath": "/docs/report.docx",
                "chunkIndex": 1,
                "totalChunks": 4,
                "content": "body text"
            }]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        let hit = parsed.value.into_iter().next().unwrap().into_hit();
        assert_eq!(hit.score, 1.25);
        assert_eq!(hit.reranker_score, Some(2.5));
        assert_eq!(hit.chunk_index, 1);
    }

    #[test]
    fn status_classification() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, None, "").is_retryable());
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, None, "").is_retryable());
        assert!(!classify_status(StatusCode::UNPROCESSABLE_ENTITY, None, "").is_retryable());
        assert!(!classify_status(StatusCode::FORBIDDEN, None, "").is_retryable());
    }
}
