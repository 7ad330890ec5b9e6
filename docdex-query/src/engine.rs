//! The multi-strategy query engine.
//!
//! One entry point, four retrieval modes:
//!
//! - **Keyword**: full-text ranking in the backend, no embedding call.
//! - **Vector**: the query is embedded (through the same provider and
//!   cache path the indexer uses) and matched by nearest neighbor.
//! - **Hybrid**: keyword and vector legs fused: natively by the backend
//!   when it supports that, otherwise by reciprocal-rank fusion here.
//! - **Semantic**: hybrid first, then the backend's semantic reranker
//!   over the top hybrid results, surfacing both scores.
//!
//! Modes are a closed enum, so adding one forces every dispatch site to
//! handle it.

use docdex_embed::{EmbedError, EmbeddingProvider, fingerprint};
use docdex_indexer::backend::{BackendError, SearchBackend, SearchHit, SearchRequest};
use docdex_indexer::store::EmbeddingCache;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::filter::{SearchFilter, build_filter_expression};
use crate::fusion::{RRF_K, reciprocal_rank_fusion};

/// Errors surfaced by a single query call. None of these affect other
/// queries or any indexing run.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("unsupported filter field: {field}")]
    InvalidFilter { field: String },

    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("search backend failed: {0}")]
    Backend(#[from] BackendError),
}

/// Retrieval strategy for one search call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Keyword,
    Vector,
    Hybrid,
    Semantic,
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "vector" => Ok(Self::Vector),
            "hybrid" => Ok(Self::Hybrid),
            "semantic" => Ok(Self::Semantic),
            _ => Err(format!(
                "invalid search mode: {s} (expected keyword, vector, hybrid, or semantic)"
            )),
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Keyword => "keyword",
            Self::Vector => "vector",
            Self::Hybrid => "hybrid",
            Self::Semantic => "semantic",
        };
        f.write_str(name)
    }
}

/// Options for one search call.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub mode: SearchMode,
    /// Number of results to return.
    pub top_k: usize,
    /// Structured filter, translated to the backend's expression syntax.
    pub filter: Option<SearchFilter>,
    /// Candidate pool for the nearest-neighbor leg.
    pub vector_candidates: usize,
    /// How many hybrid results feed the semantic reranker.
    pub rerank_depth: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            mode: SearchMode::Hybrid,
            top_k: 10,
            filter: None,
            vector_candidates: 50,
            rerank_depth: 50,
        }
    }
}

impl SearchOptions {
    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Builds and issues retrieval-mode queries against the search backend.
pub struct QueryEngine {
    backend: Arc<dyn SearchBackend>,
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<dyn EmbeddingCache>,
    use_cache: bool,
}

impl QueryEngine {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<dyn EmbeddingCache>,
    ) -> Self {
        Self {
            backend,
            provider,
            cache,
            use_cache: true,
        }
    }

    pub fn with_cache_enabled(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Execute one search in the requested mode.
    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, QueryError> {
        let filter = match &options.filter {
            Some(filter) => build_filter_expression(filter)?,
            None => None,
        };
        debug!(
            "searching mode={} top_k={} filter={:?}",
            options.mode, options.top_k, filter
        );

        match options.mode {
            SearchMode::Keyword => {
                let request = SearchRequest {
                    text: Some(query.to_string()),
                    filter,
                    top: options.top_k,
                    ..Default::default()
                };
                Ok(self.backend.search(&request).await?)
            }
            SearchMode::Vector => {
                let vector = self.query_embedding(query).await?;
                let request = SearchRequest {
                    vector: Some(vector),
                    vector_candidates: options.vector_candidates,
                    filter,
                    top: options.top_k,
                    ..Default::default()
                };
                Ok(self.backend.search(&request).await?)
            }
            SearchMode::Hybrid => {
                self.hybrid(query, filter, options, options.top_k).await
            }
            SearchMode::Semantic => {
                let candidates = self
                    .hybrid(query, filter, options, options.rerank_depth.max(options.top_k))
                    .await?;
                Ok(self
                    .backend
                    .rerank(query, &candidates, options.top_k)
                    .await?)
            }
        }
    }

    async fn hybrid(
        &self,
        query: &str,
        filter: Option<String>,
        options: &SearchOptions,
        top: usize,
    ) -> Result<Vec<SearchHit>, QueryError> {
        let vector = self.query_embedding(query).await?;

        if self.backend.supports_native_hybrid() {
            let request = SearchRequest {
                text: Some(query.to_string()),
                vector: Some(vector),
                vector_candidates: options.vector_candidates,
                filter,
                top,
            };
            return Ok(self.backend.search(&request).await?);
        }

        // The backend cannot fuse the two legs itself: issue both and
        // combine the ranked lists with RRF.
        let keyword_request = SearchRequest {
            text: Some(query.to_string()),
            filter: filter.clone(),
            top,
            ..Default::default()
        };
        let vector_request = SearchRequest {
            vector: Some(vector),
            vector_candidates: options.vector_candidates,
            filter,
            top,
            ..Default::default()
        };
        let keyword_hits = self.backend.search(&keyword_request).await?;
        let vector_hits = self.backend.search(&vector_request).await?;
        Ok(reciprocal_rank_fusion(
            &[keyword_hits, vector_hits],
            RRF_K,
            top,
        ))
    }

    /// Embed the literal query text, using the same cache path as the
    /// indexing pipeline.
    async fn query_embedding(&self, query: &str) -> Result<Vec<f32>, QueryError> {
        let key = fingerprint(query, self.provider.model_id());

        if self.use_cache {
            match self.cache.get(&key).await {
                Ok(Some(vector)) => return Ok(vector),
                Ok(None) => {}
                Err(err) => warn!("query embedding cache lookup failed: {err:#}"),
            }
        }

        let vector = self.provider.embed(query).await?;
        if self.use_cache {
            if let Err(err) = self.cache.put(&key, &vector).await {
                warn!("query embedding cache write failed: {err:#}");
            }
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docdex_indexer::backend::{IndexDocument, MemorySearchBackend};
    use docdex_indexer::extract::FileMetadata;
    use docdex_indexer::store::StateStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProvider {
        api_calls: AtomicUsize,
    }

    impl StubProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                api_calls: AtomicUsize::new(0),
            })
        }

        fn api_calls(&self) -> usize {
            self.api_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for StubProvider {
        async fn embed(&self, text: &str) -> docdex_embed::Result<Vec<f32>> {
            self.api_calls.fetch_add(1, Ordering::SeqCst);
            // Two-dimensional direction: "alpha"-ish text points one way,
            // everything else the other.
            if text.contains("alpha") {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_id(&self) -> &str {
            "stub-model"
        }
    }

    fn doc(path: &str, content: &str, vector: Vec<f32>) -> IndexDocument {
        let meta = FileMetadata {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            extension: ".txt".to_string(),
            size: content.len() as u64,
            ..Default::default()
        };
        IndexDocument::from_chunk(&meta, 0, 1, content.to_string(), vector)
    }

    async fn engine_with_docs(docs: &[IndexDocument]) -> (QueryEngine, Arc<StubProvider>) {
        let backend = Arc::new(MemorySearchBackend::new());
        backend.upload(docs).await.unwrap();
        let provider = StubProvider::new();
        let cache = Arc::new(StateStore::open_memory().await.unwrap());
        (
            QueryEngine::new(backend, provider.clone(), cache),
            provider,
        )
    }

    #[tokio::test]
    async fn keyword_mode_makes_no_embedding_call() {
        let (engine, provider) = engine_with_docs(&[
            doc("/docs/a.txt", "vacation policy details", vec![1.0, 0.0]),
            doc("/docs/b.txt", "expense report", vec![0.0, 1.0]),
        ])
        .await;

        let hits = engine
            .search(
                "vacation",
                &SearchOptions::default().with_mode(SearchMode::Keyword),
            )
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/docs/a.txt");
        assert_eq!(provider.api_calls(), 0);
    }

    #[tokio::test]
    async fn vector_mode_ranks_by_similarity() {
        let (engine, provider) = engine_with_docs(&[
            doc("/docs/a.txt", "alpha things", vec![1.0, 0.0]),
            doc("/docs/b.txt", "other things", vec![0.0, 1.0]),
        ])
        .await;

        let hits = engine
            .search(
                "alpha question",
                &SearchOptions::default().with_mode(SearchMode::Vector),
            )
            .await
            .unwrap();

        assert_eq!(hits[0].path, "/docs/a.txt");
        assert_eq!(provider.api_calls(), 1);
    }

    #[tokio::test]
    async fn hybrid_mode_fuses_both_legs() {
        // "alpha report": the keyword leg favors the document with both
        // terms; the vector leg favors the alpha-direction document.
        let (engine, _provider) = engine_with_docs(&[
            doc("/docs/alpha.txt", "alpha alpha alpha", vec![1.0, 0.0]),
            doc("/docs/report.txt", "alpha report", vec![0.0, 1.0]),
            doc("/docs/noise.txt", "unrelated", vec![0.5, 0.5]),
        ])
        .await;

        let hits = engine
            .search(
                "alpha report",
                &SearchOptions::default().with_mode(SearchMode::Hybrid),
            )
            .await
            .unwrap();

        // Both contributing documents fuse in; the keyword-less,
        // low-similarity one trails.
        assert!(hits.len() >= 2);
        let ids: Vec<&str> = hits.iter().map(|h| h.path.as_str()).collect();
        assert!(ids.contains(&"/docs/alpha.txt"));
        assert!(ids.contains(&"/docs/report.txt"));
        assert_ne!(ids[0], "/docs/noise.txt");
    }

    #[tokio::test]
    async fn semantic_mode_surfaces_both_scores() {
        let (engine, _provider) = engine_with_docs(&[
            doc("/docs/a.txt", "vacation policy for employees", vec![1.0, 0.0]),
            doc("/docs/b.txt", "vacation photos", vec![0.9, 0.1]),
        ])
        .await;

        let hits = engine
            .search(
                "vacation policy",
                &SearchOptions::default().with_mode(SearchMode::Semantic),
            )
            .await
            .unwrap();

        assert!(!hits.is_empty());
        assert_eq!(hits[0].path, "/docs/a.txt");
        assert!(hits.iter().all(|h| h.reranker_score.is_some()));
    }

    #[tokio::test]
    async fn query_embeddings_are_cached_across_calls() {
        let (engine, provider) = engine_with_docs(&[doc(
            "/docs/a.txt",
            "alpha things",
            vec![1.0, 0.0],
        )])
        .await;

        let options = SearchOptions::default().with_mode(SearchMode::Vector);
        engine.search("alpha question", &options).await.unwrap();
        engine.search("alpha question", &options).await.unwrap();

        assert_eq!(provider.api_calls(), 1);
    }

    #[tokio::test]
    async fn invalid_filter_fails_the_query_only() {
        let (engine, provider) = engine_with_docs(&[doc(
            "/docs/a.txt",
            "vacation",
            vec![1.0, 0.0],
        )])
        .await;

        let options = SearchOptions::default()
            .with_mode(SearchMode::Keyword)
            .with_filter(SearchFilter::default().with_field("embedding", "x"));
        let err = engine.search("vacation", &options).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter { .. }));

        // The engine is still usable afterwards.
        let hits = engine
            .search(
                "vacation",
                &SearchOptions::default().with_mode(SearchMode::Keyword),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(provider.api_calls(), 0);
    }

    #[tokio::test]
    async fn filters_narrow_results() {
        let (engine, _provider) = engine_with_docs(&[
            doc("/docs/a.txt", "vacation", vec![1.0, 0.0]),
            {
                let mut d = doc("/docs/b.md", "vacation", vec![0.0, 1.0]);
                d.extension = ".md".to_string();
                d
            },
        ])
        .await;

        let options = SearchOptions::default()
            .with_mode(SearchMode::Keyword)
            .with_filter(SearchFilter::default().with_extension(".md"));
        let hits = engine.search("vacation", &options).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/docs/b.md");
    }
}
