//! docdex-indexer: incremental vector indexing for office documents
//!
//! This crate turns a directory of documents into embedding-bearing chunks
//! in a remote search index, minimizing redundant embedding calls and
//! staying safely re-runnable: unchanged files are skipped via a persisted
//! size/mtime tracker, repeated chunk text hits a content-addressed
//! embedding cache, and document ids are stable so re-uploads overwrite
//! instead of duplicating.
//!
//! ## Key Modules
//!
//! - **[`pipeline`]**: the [`pipeline::VectorIndexingPipeline`] orchestrator
//!   and run statistics
//! - **[`store`]**: persisted tracker and embedding cache (SQLite)
//! - **[`backend`]**: the remote search service contract, HTTP and
//!   in-memory implementations
//! - **[`uploader`]**: bounded-batch document upload with retry
//! - **[`extract`]**: the content-extraction collaborator contract
//! - **[`config`]**: TOML + environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docdex_indexer::backend::MemorySearchBackend;
//! use docdex_indexer::extract::PlainTextExtractor;
//! use docdex_indexer::pipeline::{PipelineConfig, VectorIndexingPipeline};
//! use docdex_indexer::store::StateStore;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example(provider: Arc<dyn docdex_embed::EmbeddingProvider>) -> anyhow::Result<()> {
//! let store = Arc::new(StateStore::open(Path::new(".docdex.db")).await?);
//! let pipeline = VectorIndexingPipeline::new(
//!     PipelineConfig::default(),
//!     Arc::new(PlainTextExtractor),
//!     provider,
//!     store.clone(),
//!     store,
//!     Arc::new(MemorySearchBackend::new()),
//! )?;
//! let stats = pipeline.index_directory(Path::new("/srv/docs"), true).await?;
//! println!("indexed {} files", stats.files_succeeded);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod extract;
pub mod pipeline;
pub mod store;
pub mod uploader;
