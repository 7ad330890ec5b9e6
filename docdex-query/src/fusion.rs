//! Reciprocal-rank fusion of ranked result lists.
//!
//! Used for hybrid search when the backend cannot fuse keyword and vector
//! legs natively: each document scores `Σ 1 / (k + rank)` over the lists
//! it appears in, with ranks 1-based and `k = 60`. Ties break on document
//! id, so fusion is fully deterministic for fixed inputs.

use docdex_indexer::backend::SearchHit;
use std::collections::HashMap;

/// The standard RRF dampening constant.
pub const RRF_K: f64 = 60.0;

/// Fuse ranked lists into one list of at most `top` hits.
///
/// The fused primary score replaces the per-list scores (which are not on
/// comparable scales across keyword and vector retrieval); any reranker
/// score is cleared.
pub fn reciprocal_rank_fusion(lists: &[Vec<SearchHit>], k: f64, top: usize) -> Vec<SearchHit> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut hits_by_id: HashMap<String, SearchHit> = HashMap::new();

    for list in lists {
        for (rank, hit) in list.iter().enumerate() {
            *scores.entry(hit.id.clone()).or_default() += 1.0 / (k + (rank + 1) as f64);
            hits_by_id
                .entry(hit.id.clone())
                .or_insert_with(|| hit.clone());
        }
    }

    let mut fused: Vec<SearchHit> = hits_by_id
        .into_values()
        .map(|mut hit| {
            hit.score = scores[&hit.id];
            hit.reranker_score = None;
            hit
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    fused.truncate(top);
    fused
}
