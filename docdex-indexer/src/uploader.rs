//! Batched document upload with bounded retry.

use docdex_embed::RetryPolicy;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::{IndexDocument, SearchBackend, UploadOutcome};

/// Groups prepared documents into bounded batches and pushes them to the
/// search backend.
///
/// Batches cap both the request payload size and the blast radius of a
/// single failure: a batch the service rejects wholesale is retried under
/// the shared [`RetryPolicy`], and once retries are exhausted only that
/// batch's documents are marked failed and later batches still run.
/// Per-document errors inside an accepted batch fail only those documents.
pub struct BatchUploader {
    backend: Arc<dyn SearchBackend>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl BatchUploader {
    pub fn new(backend: Arc<dyn SearchBackend>, batch_size: usize, retry: RetryPolicy) -> Self {
        Self {
            backend,
            batch_size: batch_size.max(1),
            retry,
        }
    }

    /// Upload all documents, returning one outcome per document in input
    /// order. This never fails as a whole: batch-level errors are folded
    /// into per-document failures.
    pub async fn upload(&self, documents: &[IndexDocument]) -> Vec<UploadOutcome> {
        let mut outcomes = Vec::with_capacity(documents.len());

        for batch in documents.chunks(self.batch_size) {
            let result = self
                .retry
                .run(|attempt| {
                    debug!("uploading batch of {} documents (attempt {attempt})", batch.len());
                    self.backend.upload(batch)
                })
                .await;

            match result {
                Ok(batch_outcomes) => outcomes.extend(batch_outcomes),
                Err(err) => {
                    warn!("batch of {} documents failed after retries: {err}", batch.len());
                    outcomes.extend(
                        batch
                            .iter()
                            .map(|doc| UploadOutcome::failure(&doc.id, err.to_string())),
                    );
                }
            }
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemorySearchBackend;
    use crate::extract::FileMetadata;
    use std::time::Duration;

    fn docs(n: usize) -> Vec<IndexDocument> {
        let meta = FileMetadata {
            name: "a.txt".into(),
            path: "/docs/a.txt".into(),
            extension: ".txt".into(),
            size: 1,
            ..Default::default()
        };
        (0..n)
            .map(|i| IndexDocument::from_chunk(&meta, i, n, format!("chunk {i}"), vec![]))
            .collect()
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn uploads_in_bounded_batches() {
        let backend = Arc::new(MemorySearchBackend::new());
        let uploader = BatchUploader::new(backend.clone(), 2, fast_retry(1));

        let outcomes = uploader.upload(&docs(5)).await;
        assert_eq!(outcomes.len(), 5);
        assert!(outcomes.iter().all(|o| o.succeeded));
        assert_eq!(backend.document_count(), 5);
    }

    #[tokio::test]
    async fn batch_failure_is_retried_then_succeeds() {
        let backend = Arc::new(MemorySearchBackend::new());
        backend.fail_next_batches(1);
        let uploader = BatchUploader::new(backend.clone(), 10, fast_retry(3));

        let outcomes = uploader.upload(&docs(3)).await;
        assert!(outcomes.iter().all(|o| o.succeeded));
        assert_eq!(backend.document_count(), 3);
    }

    #[tokio::test]
    async fn exhausted_batch_fails_without_aborting_later_batches() {
        let backend = Arc::new(MemorySearchBackend::new());
        // First batch fails on both attempts; the second batch is clean.
        backend.fail_next_batches(2);
        let uploader = BatchUploader::new(backend.clone(), 2, fast_retry(2));

        let outcomes = uploader.upload(&docs(4)).await;
        assert_eq!(outcomes.len(), 4);
        assert!(!outcomes[0].succeeded);
        assert!(!outcomes[1].succeeded);
        assert!(outcomes[2].succeeded);
        assert!(outcomes[3].succeeded);
        assert_eq!(backend.document_count(), 2);
    }

    #[tokio::test]
    async fn partial_batch_failure_surfaces_only_failing_documents() {
        let backend = Arc::new(MemorySearchBackend::new());
        let documents = docs(3);
        backend.fail_documents([documents[1].id.clone()]);
        let uploader = BatchUploader::new(backend.clone(), 10, fast_retry(1));

        let outcomes = uploader.upload(&documents).await;
        assert!(outcomes[0].succeeded);
        assert!(!outcomes[1].succeeded);
        assert!(outcomes[2].succeeded);
        assert_eq!(backend.document_count(), 2);
    }
}
