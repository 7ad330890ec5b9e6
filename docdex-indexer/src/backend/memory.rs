//! In-process search backend for tests and offline runs.
//!
//! Implements the full [`SearchBackend`] contract against a `HashMap`:
//! term-frequency scoring for keyword queries, cosine similarity for
//! vector queries, and lexical-overlap scoring for reranking. It reports
//! no native hybrid support, so callers exercise their own rank fusion
//! against it. Failure injection hooks let tests drive the uploader's
//! batch-retry and partial-failure paths.
//!
//! Only an `eq`/`ge`/`le` subset of the filter syntax is evaluated here;
//! clauses outside that subset are ignored.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use super::{BackendError, IndexDocument, SearchBackend, SearchHit, SearchRequest, UploadOutcome};

/// In-memory search index.
#[derive(Debug, Default)]
pub struct MemorySearchBackend {
    docs: Mutex<HashMap<String, IndexDocument>>,
    fail_ids: Mutex<HashSet<String>>,
    fail_batches: AtomicU32,
}

impl MemorySearchBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` upload batches wholesale with a transient error.
    pub fn fail_next_batches(&self, n: u32) {
        self.fail_batches.store(n, Ordering::SeqCst);
    }

    /// Mark document ids that fail individually inside otherwise accepted
    /// batches.
    pub fn fail_documents<I: IntoIterator<Item = String>>(&self, ids: I) {
        let mut fail_ids = self.fail_ids.lock().unwrap();
        fail_ids.extend(ids);
    }

    /// Total number of stored documents.
    pub fn document_count(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    /// All stored documents for one file path, ordered by chunk index.
    pub fn documents_for_path(&self, path: &str) -> Vec<IndexDocument> {
        let docs = self.docs.lock().unwrap();
        let mut matching: Vec<IndexDocument> =
            docs.values().filter(|d| d.path == path).cloned().collect();
        matching.sort_by_key(|d| d.chunk_index);
        matching
    }
}

#[async_trait]
impl SearchBackend for MemorySearchBackend {
    async fn upload(&self, documents: &[IndexDocument]) -> Result<Vec<UploadOutcome>, BackendError> {
        if self.fail_batches.load(Ordering::SeqCst) > 0 {
            self.fail_batches.fetch_sub(1, Ordering::SeqCst);
            return Err(BackendError::transient("injected batch failure"));
        }

        let fail_ids = self.fail_ids.lock().unwrap().clone();
        let mut docs = self.docs.lock().unwrap();
        let outcomes = documents
            .iter()
            .map(|doc| {
                if fail_ids.contains(&doc.id) {
                    UploadOutcome::failure(&doc.id, "injected document failure")
                } else {
                    docs.insert(doc.id.clone(), doc.clone());
                    UploadOutcome::success(&doc.id)
                }
            })
            .collect();
        Ok(outcomes)
    }

    async fn delete(&self, ids: &[String]) -> Result<(), BackendError> {
        let mut docs = self.docs.lock().unwrap();
        for id in ids {
            docs.remove(id);
        }
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, BackendError> {
        let docs = self.docs.lock().unwrap();
        let mut hits: Vec<SearchHit> = Vec::new();

        for doc in docs.values() {
            if let Some(filter) = &request.filter {
                if !matches_filter(doc, filter) {
                    continue;
                }
            }

            let mut score = 0.0;
            if let Some(text) = &request.text {
                let keyword = keyword_score(doc, text);
                if keyword == 0.0 {
                    continue;
                }
                score += keyword;
            }
            if let Some(vector) = &request.vector {
                score += cosine_similarity(vector, &doc.content_vector);
            }

            hits.push(hit_from_doc(doc, score));
        }

        sort_hits(&mut hits);
        hits.truncate(request.top);
        Ok(hits)
    }

    async fn rerank(
        &self,
        query: &str,
        hits: &[SearchHit],
        top: usize,
    ) -> Result<Vec<SearchHit>, BackendError> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let mut reranked: Vec<SearchHit> = hits
            .iter()
            .map(|hit| {
                let content = hit.content.to_lowercase();
                let matched = terms.iter().filter(|t| content.contains(*t)).count();
                let overlap = if terms.is_empty() {
                    0.0
                } else {
                    matched as f64 / terms.len() as f64
                };
                let mut hit = hit.clone();
                // Scaled to the 0..4 range semantic rankers typically use.
                hit.reranker_score = Some(overlap * 4.0);
                hit
            })
            .collect();

        reranked.sort_by(|a, b| {
            b.reranker_score
                .partial_cmp(&a.reranker_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        reranked.truncate(top);
        Ok(reranked)
    }

    fn supports_native_hybrid(&self) -> bool {
        false
    }
}

fn hit_from_doc(doc: &IndexDocument, score: f64) -> SearchHit {
    SearchHit {
        id: doc.id.clone(),
        name: doc.name.clone(),
        path: doc.path.clone(),
        chunk_index: doc.chunk_index,
        total_chunks: doc.total_chunks,
        modified: doc.modified,
        content: doc.content.clone(),
        score,
        reranker_score: None,
    }
}

fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Occurrences of each query term in the document content and name.
fn keyword_score(doc: &IndexDocument, query: &str) -> f64 {
    let haystack = format!("{} {}", doc.content, doc.name).to_lowercase();
    query
        .to_lowercase()
        .split_whitespace()
        .map(|term| haystack.matches(term).count() as f64)
        .sum()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Evaluate the `eq`/`ge`/`le` subset of the filter syntax.
fn matches_filter(doc: &IndexDocument, filter: &str) -> bool {
    filter.split(" and ").all(|clause| {
        let clause = clause.trim();
        let mut parts = clause.splitn(3, ' ');
        let (Some(field), Some(op), Some(value)) = (parts.next(), parts.next(), parts.next())
        else {
            return true;
        };
        let value = value.trim().trim_matches('\'').replace("''", "'");

        match (field, op) {
            ("extension", "eq") => doc.extension == value,
            ("name", "eq") => doc.name == value,
            ("author", "eq") => doc.author.as_deref() == Some(value.as_str()),
            ("modifiedDateTime", "ge") => match (doc.modified, value.parse::<DateTime<Utc>>()) {
                (Some(modified), Ok(bound)) => modified >= bound,
                _ => false,
            },
            ("modifiedDateTime", "le") => match (doc.modified, value.parse::<DateTime<Utc>>()) {
                (Some(modified), Ok(bound)) => modified <= bound,
                _ => false,
            },
            _ => true,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::FileMetadata;

    fn doc(path: &str, index: usize, content: &str, vector: Vec<f32>) -> IndexDocument {
        let meta = FileMetadata {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            extension: crate::extract::file_extension(std::path::Path::new(path)),
            size: content.len() as u64,
            ..Default::default()
        };
        IndexDocument::from_chunk(&meta, index, index + 1, content.to_string(), vector)
    }

    #[tokio::test]
    async fn keyword_search_ranks_by_term_frequency() {
        let backend = MemorySearchBackend::new();
        backend
            .upload(&[
                doc("/docs/a.txt", 0, "budget review budget", vec![]),
                doc("/docs/b.txt", 0, "budget once", vec![]),
                doc("/docs/c.txt", 0, "nothing relevant", vec![]),
            ])
            .await
            .unwrap();

        let hits = backend
            .search(&SearchRequest {
                text: Some("budget".into()),
                top: 10,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].path, "/docs/a.txt");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn vector_search_ranks_by_cosine() {
        let backend = MemorySearchBackend::new();
        backend
            .upload(&[
                doc("/docs/a.txt", 0, "x", vec![1.0, 0.0]),
                doc("/docs/b.txt", 0, "y", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = backend
            .search(&SearchRequest {
                vector: Some(vec![0.9, 0.1]),
                top: 10,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(hits[0].path, "/docs/a.txt");
    }

    #[tokio::test]
    async fn upload_replaces_documents_by_id() {
        let backend = MemorySearchBackend::new();
        backend
            .upload(&[doc("/docs/a.txt", 0, "old", vec![])])
            .await
            .unwrap();
        backend
            .upload(&[doc("/docs/a.txt", 0, "new", vec![])])
            .await
            .unwrap();

        assert_eq!(backend.document_count(), 1);
        assert_eq!(backend.documents_for_path("/docs/a.txt")[0].content, "new");
    }

    #[tokio::test]
    async fn failure_injection() {
        let backend = MemorySearchBackend::new();

        backend.fail_next_batches(1);
        assert!(backend.upload(&[doc("/docs/a.txt", 0, "x", vec![])]).await.is_err());
        // Next batch goes through.
        assert!(backend.upload(&[doc("/docs/a.txt", 0, "x", vec![])]).await.is_ok());

        let failing = doc("/docs/b.txt", 0, "y", vec![]);
        backend.fail_documents([failing.id.clone()]);
        let outcomes = backend
            .upload(&[failing, doc("/docs/c.txt", 0, "z", vec![])])
            .await
            .unwrap();
        assert!(!outcomes[0].succeeded);
        assert!(outcomes[1].succeeded);
    }

    #[tokio::test]
    async fn filters_apply_to_keyword_search() {
        let backend = MemorySearchBackend::new();
        backend
            .upload(&[
                doc("/docs/a.md", 0, "budget", vec![]),
                doc("/docs/b.txt", 0, "budget", vec![]),
            ])
            .await
            .unwrap();

        let hits = backend
            .search(&SearchRequest {
                text: Some("budget".into()),
                filter: Some("extension eq '.md'".into()),
                top: 10,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/docs/a.md");
    }

    #[tokio::test]
    async fn rerank_scores_lexical_overlap() {
        let backend = MemorySearchBackend::new();
        let hits = vec![
            SearchHit {
                id: "1".into(),
                name: "a".into(),
                path: "/a".into(),
                chunk_index: 0,
                total_chunks: 1,
                modified: None,
                content: "vacation policy for employees".into(),
                score: 0.3,
                reranker_score: None,
            },
            SearchHit {
                id: "2".into(),
                name: "b".into(),
                path: "/b".into(),
                chunk_index: 0,
                total_chunks: 1,
                modified: None,
                content: "unrelated text".into(),
                score: 0.9,
                reranker_score: None,
            },
        ];

        let reranked = backend.rerank("vacation policy", &hits, 10).await.unwrap();
        assert_eq!(reranked[0].id, "1");
        assert!(reranked[0].reranker_score.unwrap() > reranked[1].reranker_score.unwrap());
        // Original score preserved alongside the reranker score.
        assert_eq!(reranked[0].score, 0.3);
    }
}
