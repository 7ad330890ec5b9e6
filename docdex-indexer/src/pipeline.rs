//! The vector indexing pipeline.
//!
//! Orchestrates the full path from a directory tree to uploaded search
//! documents: enumeration → incremental skip check → extraction →
//! chunking → cache-first embedding → batched upload → tracker update,
//! accumulating run statistics throughout.
//!
//! ## Pipeline flow
//!
//! ```text
//! Files → Tracker skip check → Extractor → TokenChunker → EmbeddingCache
//!                                                              ↓ miss
//!                                            EmbeddingProvider (semaphore-gated)
//!                                                              ↓
//!                      TrackerStore ← BatchUploader ← IndexDocuments
//! ```
//!
//! ## Failure containment
//!
//! Nothing below the run level aborts a run. Extraction failures fail one
//! file; an exhausted embedding retry fails one chunk; failed chunks are
//! excluded from upload and a file with at least one uploaded document
//! still counts as indexed (with its partial-failure count noted). The
//! run returns a statistics object rather than raising on partial failure.
//!
//! ## Concurrency
//!
//! Files are processed on a bounded worker pool. Embedding calls are
//! additionally gated by one semaphore shared across all in-flight files,
//! because the remote provider rate-limits in aggregate, not per file.
//! Statistics are atomic counters, updated lock-free from every worker.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use docdex_chunk::{TokenChunker, TokenWindow};
use docdex_embed::{EmbeddingProvider, RetryPolicy, fingerprint};
use futures::stream::{self, StreamExt};
use ignore::WalkBuilder;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::UNIX_EPOCH;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::backend::{IndexDocument, SearchBackend};
use crate::extract::Extractor;
use crate::store::{EmbeddingCache, FileRecord, TrackerStore};
use crate::uploader::BatchUploader;

/// Configuration for a [`VectorIndexingPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Chunk window size in tokens.
    pub chunk_size: usize,
    /// Overlap between consecutive windows in tokens.
    pub chunk_overlap: usize,
    /// Maximum documents per upload batch.
    pub batch_size: usize,
    /// Concurrent file workers.
    pub max_workers: usize,
    /// Concurrent embedding calls, shared across all in-flight files.
    pub embed_concurrency: usize,
    /// Skip files whose recorded (size, mtime) signature is unchanged.
    pub incremental: bool,
    /// Consult and populate the embedding cache.
    pub use_cache: bool,
    /// Files larger than this many bytes are skipped.
    pub max_file_size: u64,
    /// Lowercased extensions (with leading dot) eligible for indexing.
    pub supported_extensions: Vec<String>,
    /// Directory names excluded from enumeration.
    pub excluded_dirs: Vec<String>,
    /// Retry policy for embedding and upload calls.
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: docdex_chunk::DEFAULT_CHUNK_SIZE,
            chunk_overlap: docdex_chunk::DEFAULT_CHUNK_OVERLAP,
            batch_size: 100,
            max_workers: 4,
            embed_concurrency: 8,
            incremental: true,
            use_cache: true,
            max_file_size: 100 * 1024 * 1024,
            supported_extensions: [
                ".txt", ".md", ".csv", ".docx", ".pdf", ".xlsx", ".pptx",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            excluded_dirs: [".git", "node_modules", "__pycache__", ".venv", "target"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Run-level cancellation signal.
///
/// Cancelling stops new files and new embedding calls from starting;
/// in-flight remote calls complete or fail normally. Files interrupted
/// mid-processing stay unrecorded, so the next run picks them up again.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Statistics for one indexing run.
#[derive(Debug, Clone, Serialize)]
pub struct IndexingRunStats {
    pub files_seen: u64,
    pub files_skipped: u64,
    pub files_succeeded: u64,
    pub files_failed: u64,
    /// Chunk windows produced by the chunker.
    pub chunks_created: u64,
    /// Embeddings attached to chunks, whether from cache or the provider.
    pub embeddings_generated: u64,
    /// Actual remote embedding calls; lower than `embeddings_generated`
    /// when the cache hits.
    pub embedding_api_calls: u64,
    /// Chunks lost to embedding or upload failures.
    pub chunk_failures: u64,
    pub bytes_processed: u64,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RunCounters {
    files_skipped: AtomicU64,
    files_succeeded: AtomicU64,
    files_failed: AtomicU64,
    chunks_created: AtomicU64,
    embeddings_generated: AtomicU64,
    embedding_api_calls: AtomicU64,
    chunk_failures: AtomicU64,
    bytes_processed: AtomicU64,
}

impl RunCounters {
    fn snapshot(
        &self,
        files_seen: u64,
        started: DateTime<Utc>,
        finished: DateTime<Utc>,
    ) -> IndexingRunStats {
        IndexingRunStats {
            files_seen,
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            files_succeeded: self.files_succeeded.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            chunks_created: self.chunks_created.load(Ordering::Relaxed),
            embeddings_generated: self.embeddings_generated.load(Ordering::Relaxed),
            embedding_api_calls: self.embedding_api_calls.load(Ordering::Relaxed),
            chunk_failures: self.chunk_failures.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            started,
            finished,
        }
    }
}

/// Terminal state of one file within a run.
#[derive(Debug)]
enum FileOutcome {
    /// Unchanged (or over the size limit); nothing was done.
    Skipped,
    /// Documents uploaded and the tracker updated.
    Recorded { uploaded: usize, failed_chunks: usize },
    /// The file produced nothing; it stays unrecorded.
    Failed { reason: String },
    /// The run was cancelled before this file started real work.
    Cancelled,
}

/// Orchestrates chunking, embedding, and uploading over a directory tree.
///
/// All collaborators are injected: stores, extractor, embedding provider,
/// and search backend are trait objects, so tests run the whole pipeline
/// against in-memory implementations.
pub struct VectorIndexingPipeline {
    config: PipelineConfig,
    chunker: TokenChunker,
    extractor: Arc<dyn Extractor>,
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<dyn EmbeddingCache>,
    tracker: Arc<dyn TrackerStore>,
    backend: Arc<dyn SearchBackend>,
    uploader: BatchUploader,
    embed_limiter: Arc<Semaphore>,
    cancel: CancellationFlag,
}

impl VectorIndexingPipeline {
    /// Build a pipeline, validating the configuration up front.
    ///
    /// Configuration problems (bad chunking parameters, zero workers) are
    /// the only fatal errors in the indexing path; everything later is
    /// contained per file or per chunk.
    pub fn new(
        config: PipelineConfig,
        extractor: Arc<dyn Extractor>,
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<dyn EmbeddingCache>,
        tracker: Arc<dyn TrackerStore>,
        backend: Arc<dyn SearchBackend>,
    ) -> Result<Self> {
        let chunker = TokenChunker::new(config.chunk_size, config.chunk_overlap)
            .context("invalid chunking configuration")?;
        if config.max_workers == 0 {
            bail!("max_workers must be at least 1");
        }
        if config.embed_concurrency == 0 {
            bail!("embed_concurrency must be at least 1");
        }

        let uploader =
            BatchUploader::new(Arc::clone(&backend), config.batch_size, config.retry.clone());
        let embed_limiter = Arc::new(Semaphore::new(config.embed_concurrency));

        Ok(Self {
            config,
            chunker,
            extractor,
            provider,
            cache,
            tracker,
            backend,
            uploader,
            embed_limiter,
            cancel: CancellationFlag::new(),
        })
    }

    /// Flag that cancels this pipeline's runs when triggered.
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Index every supported file under `root`, returning run statistics.
    ///
    /// Per-file and per-chunk failures are absorbed into the statistics;
    /// only pre-run problems (nonexistent directory, unreadable tree)
    /// surface as errors.
    pub async fn index_directory(&self, root: &Path, recursive: bool) -> Result<IndexingRunStats> {
        let started = Utc::now();
        let files = self.collect_files(root, recursive)?;
        info!(
            "indexing {} files under {} (recursive: {recursive}, incremental: {})",
            files.len(),
            root.display(),
            self.config.incremental
        );

        let files_seen = files.len() as u64;
        let counters = Arc::new(RunCounters::default());

        stream::iter(files)
            .map(|path| {
                let counters = Arc::clone(&counters);
                async move {
                    let outcome = if self.cancel.is_cancelled() {
                        FileOutcome::Cancelled
                    } else {
                        self.process_file(&path, &counters).await
                    };
                    tally(&counters, &path, outcome);
                }
            })
            .buffer_unordered(self.config.max_workers)
            .collect::<Vec<()>>()
            .await;

        let stats = counters.snapshot(files_seen, started, Utc::now());
        info!(
            "run finished: {} succeeded, {} skipped, {} failed, {} chunks, {} embedding calls",
            stats.files_succeeded,
            stats.files_skipped,
            stats.files_failed,
            stats.chunks_created,
            stats.embedding_api_calls
        );
        Ok(stats)
    }

    /// Index a single file, returning the number of chunks uploaded.
    pub async fn index_file(&self, path: &Path) -> Result<usize> {
        let counters = RunCounters::default();
        match self.process_file(path, &counters).await {
            FileOutcome::Recorded { uploaded, .. } => Ok(uploaded),
            FileOutcome::Skipped | FileOutcome::Cancelled => Ok(0),
            FileOutcome::Failed { reason } => bail!("failed to index {}: {reason}", path.display()),
        }
    }

    fn collect_files(&self, root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            bail!("not a directory: {}", root.display());
        }

        let mut builder = WalkBuilder::new(root);
        builder.standard_filters(false).follow_links(false);
        if !recursive {
            builder.max_depth(Some(1));
        }
        let excluded = self.config.excluded_dirs.clone();
        builder.filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && excluded.iter().any(|d| entry.file_name().to_string_lossy() == *d))
        });

        let mut files = Vec::new();
        for entry in builder.build() {
            let entry = entry?;
            if entry.file_type().is_some_and(|t| t.is_file()) {
                let path = entry.into_path();
                if self.is_supported(&path) {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    fn is_supported(&self, path: &Path) -> bool {
        let extension = crate::extract::file_extension(path);
        !extension.is_empty()
            && self
                .config
                .supported_extensions
                .iter()
                .any(|e| e == &extension)
    }

    async fn process_file(&self, path: &Path, counters: &RunCounters) -> FileOutcome {
        match self.process_file_inner(path, counters).await {
            Ok(outcome) => outcome,
            Err(err) => FileOutcome::Failed {
                reason: format!("{err:#}"),
            },
        }
    }

    async fn process_file_inner(&self, path: &Path, counters: &RunCounters) -> Result<FileOutcome> {
        let path_str = path.to_string_lossy().into_owned();

        let fs_meta = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("failed to stat {}", path.display()))?;
        let size = fs_meta.len();
        if size > self.config.max_file_size {
            warn!(
                "skipping {}: {size} bytes exceeds the {} byte limit",
                path.display(),
                self.config.max_file_size
            );
            return Ok(FileOutcome::Skipped);
        }
        let mtime = fs_meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        // Skip check: unchanged signature means no extraction, no chunking,
        // no upload.
        if self.config.incremental
            && !self
                .tracker
                .should_process(&path_str, size as i64, mtime)
                .await?
        {
            debug!("skipping unchanged file {path_str}");
            return Ok(FileOutcome::Skipped);
        }

        // Extraction failures fail this file only.
        let meta = match self.extractor.extract_metadata(path).await {
            Ok(meta) => meta,
            Err(err) => {
                return Ok(FileOutcome::Failed {
                    reason: format!("metadata extraction failed: {err}"),
                });
            }
        };
        let text = match self.extractor.extract_text(path).await {
            Ok(text) => text,
            Err(err) => {
                return Ok(FileOutcome::Failed {
                    reason: format!("extraction failed: {err}"),
                });
            }
        };

        let windows = self.chunker.chunk(&text);
        let total = windows.len();
        counters
            .chunks_created
            .fetch_add(total as u64, Ordering::Relaxed);

        let previous = self.tracker.get(&path_str).await?;

        if total == 0 {
            // Empty extraction is a no-op success: recorded with zero
            // documents, and any documents from a previous indexing of
            // this file are removed.
            self.remove_stale_documents(&path_str, previous.as_ref(), 0)
                .await?;
            self.record(&path_str, size, mtime, 0, counters).await?;
            return Ok(FileOutcome::Recorded {
                uploaded: 0,
                failed_chunks: 0,
            });
        }

        let embedded = self.embed_windows(&windows, counters).await;
        let mut documents = Vec::new();
        let mut failed_chunks = 0usize;
        for (window, vector) in windows.iter().zip(embedded) {
            match vector {
                Some(vector) => documents.push(IndexDocument::from_chunk(
                    &meta,
                    window.index,
                    total,
                    window.text.clone(),
                    vector,
                )),
                None => failed_chunks += 1,
            }
        }
        counters
            .chunk_failures
            .fetch_add(failed_chunks as u64, Ordering::Relaxed);
        if documents.is_empty() {
            return Ok(FileOutcome::Failed {
                reason: format!("all {total} chunks failed to embed"),
            });
        }

        let outcomes = self.uploader.upload(&documents).await;
        let uploaded = outcomes.iter().filter(|o| o.succeeded).count();
        let failed_documents = outcomes.len() - uploaded;
        counters
            .chunk_failures
            .fetch_add(failed_documents as u64, Ordering::Relaxed);
        if uploaded == 0 {
            return Ok(FileOutcome::Failed {
                reason: "no documents uploaded".to_string(),
            });
        }

        // The upload must fully replace the file's previous chunk set: if
        // the chunk count shrank, documents beyond the new count would
        // otherwise linger with stale content.
        self.remove_stale_documents(&path_str, previous.as_ref(), total)
            .await?;

        self.record(&path_str, size, mtime, total, counters).await?;
        Ok(FileOutcome::Recorded {
            uploaded,
            failed_chunks: failed_chunks + failed_documents,
        })
    }

    async fn record(
        &self,
        path: &str,
        size: u64,
        mtime: i64,
        chunk_count: usize,
        counters: &RunCounters,
    ) -> Result<()> {
        self.tracker
            .record_success(&FileRecord {
                path: path.to_string(),
                size: size as i64,
                mtime,
                chunk_count: chunk_count as i64,
            })
            .await?;
        counters.bytes_processed.fetch_add(size, Ordering::Relaxed);
        Ok(())
    }

    async fn embed_windows(
        &self,
        windows: &[TokenWindow],
        counters: &RunCounters,
    ) -> Vec<Option<Vec<f32>>> {
        stream::iter(windows)
            .map(|window| self.embed_window(window, counters))
            .buffered(self.config.embed_concurrency)
            .collect()
            .await
    }

    async fn embed_window(
        &self,
        window: &TokenWindow,
        counters: &RunCounters,
    ) -> Option<Vec<f32>> {
        let key = fingerprint(&window.text, self.provider.model_id());

        if self.config.use_cache {
            match self.cache.get(&key).await {
                Ok(Some(vector)) => {
                    counters
                        .embeddings_generated
                        .fetch_add(1, Ordering::Relaxed);
                    return Some(vector);
                }
                Ok(None) => {}
                Err(err) => warn!("cache lookup failed, treating as miss: {err:#}"),
            }
        }

        if self.cancel.is_cancelled() {
            return None;
        }
        let _permit = self.embed_limiter.acquire().await.ok()?;
        if self.cancel.is_cancelled() {
            return None;
        }

        match self.provider.embed(&window.text).await {
            Ok(vector) => {
                counters
                    .embedding_api_calls
                    .fetch_add(1, Ordering::Relaxed);
                counters
                    .embeddings_generated
                    .fetch_add(1, Ordering::Relaxed);
                // Populate the cache before the vector is used downstream:
                // a crash between here and upload repeats at most one call.
                if self.config.use_cache {
                    if let Err(err) = self.cache.put(&key, &vector).await {
                        warn!("cache write failed: {err:#}");
                    }
                }
                Some(vector)
            }
            Err(err) => {
                warn!("embedding failed for chunk {}: {err}", window.index);
                None
            }
        }
    }

    async fn remove_stale_documents(
        &self,
        path: &str,
        previous: Option<&FileRecord>,
        new_total: usize,
    ) -> Result<()> {
        let Some(previous) = previous else {
            return Ok(());
        };
        let previous_total = previous.chunk_count.max(0) as usize;
        if previous_total <= new_total {
            return Ok(());
        }

        let stale: Vec<String> = (new_total..previous_total)
            .map(|index| IndexDocument::id_for(path, index))
            .collect();
        debug!("removing {} stale documents for {path}", stale.len());
        self.backend
            .delete(&stale)
            .await
            .map_err(|err| anyhow::anyhow!("failed to delete stale documents: {err}"))?;
        Ok(())
    }
}

fn tally(counters: &RunCounters, path: &Path, outcome: FileOutcome) {
    match outcome {
        FileOutcome::Skipped => {
            counters.files_skipped.fetch_add(1, Ordering::Relaxed);
        }
        FileOutcome::Recorded {
            uploaded,
            failed_chunks,
        } => {
            counters.files_succeeded.fetch_add(1, Ordering::Relaxed);
            if failed_chunks > 0 {
                warn!(
                    "indexed {} with partial failures: {uploaded} uploaded, {failed_chunks} failed",
                    path.display()
                );
            } else {
                debug!("indexed {} ({uploaded} chunks)", path.display());
            }
        }
        FileOutcome::Failed { reason } => {
            counters.files_failed.fetch_add(1, Ordering::Relaxed);
            warn!("failed to index {}: {reason}", path.display());
        }
        FileOutcome::Cancelled => {
            debug!("cancelled before processing {}", path.display());
        }
    }
}
