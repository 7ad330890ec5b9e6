//! docdex-query: multi-strategy retrieval over the docdex search index.
//!
//! Exposes the [`QueryEngine`] with four retrieval modes (keyword, vector,
//! hybrid, semantic), structured [`SearchFilter`] translation into the
//! backend's filter syntax, and reciprocal-rank fusion for backends that
//! cannot fuse keyword and vector legs natively. The `docdex` binary in
//! this crate is the application surface over both this engine and the
//! indexing pipeline.

pub mod engine;
pub mod filter;
pub mod format;
pub mod fusion;

pub use engine::{QueryEngine, QueryError, SearchMode, SearchOptions};
pub use filter::{SearchFilter, build_filter_expression};
pub use format::format_results;
pub use fusion::{RRF_K, reciprocal_rank_fusion};
