//! # docdex-embed
//!
//! Embedding subsystem for docdex: turns chunk text into fixed-dimension
//! vectors via a remote, rate-limited embeddings API, with the retry and
//! fingerprinting machinery the indexing pipeline builds on.
//!
//! ## Modules
//!
//! - [`provider`]: the [`EmbeddingProvider`] trait and the remote
//!   [`HttpEmbeddingProvider`]
//! - [`retry`]: the explicit [`RetryPolicy`] object shared with the
//!   document uploader
//! - [`fingerprint`]: whitespace-normalized, model-aware cache keys
//! - [`config`]: endpoint/deployment configuration
//! - [`error`]: the [`EmbedError`] taxonomy split along the retry boundary
//!
//! ## Behavior highlights
//!
//! - Input longer than the model limit is truncated deterministically
//!   before the call, never rejected, so cache fingerprints stay stable.
//! - HTTP 429 responses honor the server's `retry-after` hint; other
//!   transient failures back off exponentially.
//! - Exhausted retries surface as an error for that one text; callers
//!   decide whether that fails a chunk, a file, or a query.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod provider;
pub mod retry;

// Re-export main types for easy access
pub use config::EmbedConfig;
pub use error::{EmbedError, Result};
pub use fingerprint::{fingerprint, normalize_text};
pub use provider::{EmbeddingProvider, HttpEmbeddingProvider};
pub use retry::{RetryPolicy, Retryable};
