//! Persisted indexing state: the incremental tracker and the embedding
//! cache.
//!
//! Both stores are injected into the pipeline as trait objects rather than
//! reached through process-wide singletons, so tests run against in-memory
//! SQLite and the CLI against a database file. The shapes are deliberately
//! minimal: point lookups and atomic upserts are all the pipeline needs.

pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

pub use sqlite::StateStore;

/// Per-file indexing record owned by the tracker store.
///
/// A record exists only for files whose documents were fully uploaded at
/// least once. The `(size, mtime)` pair is the change signature; a file is
/// skipped only when both match the current on-disk values exactly.
/// `chunk_count` remembers how many documents the last successful index
/// produced, so a later re-index that shrinks the file can delete the
/// now-orphaned trailing documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute file path, the lookup key.
    pub path: String,
    /// File size in bytes at index time.
    pub size: i64,
    /// Last-modified time (Unix seconds) at index time.
    pub mtime: i64,
    /// Number of documents uploaded for this file.
    pub chunk_count: i64,
}

/// Tracks which files are already indexed and with what signature.
#[async_trait]
pub trait TrackerStore: Send + Sync {
    /// Fetch the record for a path, if one exists.
    async fn get(&self, path: &str) -> Result<Option<FileRecord>>;

    /// Whether a file needs (re)processing: true when no record exists or
    /// the recorded `(size, mtime)` signature differs from the current one.
    async fn should_process(&self, path: &str, size: i64, mtime: i64) -> Result<bool>;

    /// Record a fully uploaded file. Called only after upload completes, so
    /// a crash mid-upload leaves the file unrecorded and it is retried in
    /// full on the next run.
    async fn record_success(&self, record: &FileRecord) -> Result<()>;

    /// Drop all records, forcing a full re-index on the next run.
    async fn purge(&self) -> Result<()>;
}

/// Content-addressed embedding cache keyed by chunk fingerprint.
///
/// A fingerprint always maps to the same vector (the embedding function is
/// treated as pure for a fixed model), so entries are never mutated,
/// only inserted and, on explicit request, cleared.
#[async_trait]
pub trait EmbeddingCache: Send + Sync {
    async fn get(&self, fingerprint: &str) -> Result<Option<Vec<f32>>>;

    async fn put(&self, fingerprint: &str, embedding: &[f32]) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    /// Number of cached entries.
    async fn entry_count(&self) -> Result<usize>;
}
