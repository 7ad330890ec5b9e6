//! Content fingerprints for embedding cache keys.
//!
//! A fingerprint is a blake3 hash over whitespace-normalized chunk text
//! with the model identity folded in. Normalization makes the key
//! insensitive to formatting-only differences between otherwise identical
//! chunks; folding in the model identifier keeps vectors from different
//! models/deployments from colliding in the cache.

/// Collapse all whitespace runs to single spaces and trim the ends.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cache key for `text` embedded by `model_id`, as a hex string.
pub fn fingerprint(text: &str, model_id: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(model_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(normalize_text(text).as_bytes());
    hasher.finalize().to_hex().to_string()
}
