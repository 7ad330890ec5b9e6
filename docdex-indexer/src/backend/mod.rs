//! Remote search backend contract.
//!
//! The backend owns the uploaded documents and executes all queries; this
//! crate only produces documents and drives the service. Two
//! implementations ship here: [`http::HttpSearchBackend`] speaks the
//! index-service REST API, and [`memory::MemorySearchBackend`] keeps
//! everything in process for tests and offline runs.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docdex_embed::Retryable;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::extract::FileMetadata;

pub use http::{HttpSearchBackend, SearchBackendConfig};
pub use memory::MemorySearchBackend;

/// Errors from the remote search service, split along the retry boundary
/// the same way as [`docdex_embed::EmbedError`].
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("search service rate limited the request")]
    RateLimited { retry_after: Option<Duration> },

    #[error("transient search backend failure: {message}")]
    Transient { message: String },

    #[error("search backend rejected the request: {message}")]
    Rejected { message: String },

    #[error("invalid search backend configuration: {message}")]
    Config { message: String },

    #[error("unexpected search backend response: {message}")]
    Protocol { message: String },
}

impl BackendError {
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn rejected<S: Into<String>>(message: S) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

impl Retryable for BackendError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(source: reqwest::Error) -> Self {
        if source.is_timeout() || source.is_connect() || source.is_request() {
            Self::Transient {
                message: source.to_string(),
            }
        } else {
            Self::Protocol {
                message: source.to_string(),
            }
        }
    }
}

/// The unit uploaded to the search index: one chunk of one file, with its
/// embedding and file metadata.
///
/// Document ids are derived from the file path and chunk index, so
/// re-indexing an unchanged-length file overwrites its documents in place
/// instead of accumulating duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDocument {
    pub id: String,
    /// Chunk text.
    pub content: String,
    pub content_vector: Vec<f32>,
    pub chunk_index: i64,
    pub total_chunks: i64,
    pub title: String,
    pub name: String,
    #[serde(rename = "filePath")]
    pub path: String,
    pub extension: String,
    pub size: i64,
    #[serde(rename = "createdDateTime")]
    pub created: Option<DateTime<Utc>>,
    #[serde(rename = "modifiedDateTime")]
    pub modified: Option<DateTime<Utc>>,
    pub author: Option<String>,
}

impl IndexDocument {
    /// Stable document id for a (file, chunk index) pair.
    pub fn id_for(path: &str, chunk_index: usize) -> String {
        blake3::hash(format!("{path}#{chunk_index}").as_bytes())
            .to_hex()
            .to_string()
    }

    /// Assemble a document from chunk data and file metadata.
    pub fn from_chunk(
        meta: &FileMetadata,
        chunk_index: usize,
        total_chunks: usize,
        content: String,
        content_vector: Vec<f32>,
    ) -> Self {
        Self {
            id: Self::id_for(&meta.path, chunk_index),
            content,
            content_vector,
            chunk_index: chunk_index as i64,
            total_chunks: total_chunks as i64,
            title: meta
                .title
                .clone()
                .unwrap_or_else(|| meta.name.clone()),
            name: meta.name.clone(),
            path: meta.path.clone(),
            extension: meta.extension.clone(),
            size: meta.size as i64,
            created: meta.created,
            modified: meta.modified,
            author: meta.author.clone(),
        }
    }
}

/// Per-document result of an upload batch.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub id: String,
    pub succeeded: bool,
    pub error: Option<String>,
}

impl UploadOutcome {
    pub fn success(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            succeeded: true,
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            succeeded: false,
            error: Some(error.into()),
        }
    }
}

/// A single query against the backend. Keyword, vector, and hybrid
/// requests all use this shape; which parts are set decides the mode.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Full-text query, if any.
    pub text: Option<String>,
    /// Query embedding for nearest-neighbor retrieval, if any.
    pub vector: Option<Vec<f32>>,
    /// Candidate pool size for the nearest-neighbor leg.
    pub vector_candidates: usize,
    /// Filter expression in the backend's native syntax.
    pub filter: Option<String>,
    /// Number of results to return.
    pub top: usize,
}

/// One ranked result from the backend, normalized across modes.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub name: String,
    pub path: String,
    pub chunk_index: i64,
    pub total_chunks: i64,
    pub modified: Option<DateTime<Utc>>,
    pub content: String,
    /// Primary relevance score.
    pub score: f64,
    /// Secondary score from semantic reranking, when requested.
    pub reranker_score: Option<f64>,
}

/// Contract for the remote search service.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Upsert a batch of documents keyed by their stable ids. Returns one
    /// outcome per input document, in input order. An `Err` means the whole
    /// batch was rejected.
    async fn upload(&self, documents: &[IndexDocument]) -> Result<Vec<UploadOutcome>, BackendError>;

    /// Delete documents by id. Unknown ids are not an error.
    async fn delete(&self, ids: &[String]) -> Result<(), BackendError>;

    /// Execute a keyword/vector/hybrid query.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, BackendError>;

    /// Rerank the given hits with the service's semantic ranking
    /// capability, surfacing a secondary score alongside the original one.
    async fn rerank(
        &self,
        query: &str,
        hits: &[SearchHit],
        top: usize,
    ) -> Result<Vec<SearchHit>, BackendError>;

    /// Whether the service fuses keyword and vector legs natively in a
    /// single request. When false, callers fuse ranked lists themselves.
    fn supports_native_hybrid(&self) -> bool;
}
