//! Token-window chunking for document text.
//!
//! Documents are split into overlapping windows of whitespace-delimited
//! tokens before embedding. The same text chunked with the same
//! configuration always yields the same windows, byte for byte; downstream
//! embedding caches fingerprint window text, so any nondeterminism here
//! would silently defeat them.
//!
//! The two main types are:
//! - [`Tokenizer`]: locates token spans in the original text and provides
//!   deterministic token counting and truncation.
//! - [`TokenChunker`]: emits [`TokenWindow`]s of a configured size and
//!   overlap over those spans.
//!
//! Window text is always a byte slice of the original input, spanning from
//! the first to the last token of the window, so interior whitespace and
//! formatting survive intact.
//!
//! ```
//! use docdex_chunk::TokenChunker;
//!
//! let chunker = TokenChunker::new(4, 1).unwrap();
//! let windows = chunker.chunk("one two three four five six");
//!
//! assert_eq!(windows.len(), 2);
//! assert_eq!(windows[0].text, "one two three four");
//! assert_eq!(windows[1].text, "four five six");
//! ```

use regex::Regex;
use serde::Serialize;
use std::ops::Range;

/// Default window size in tokens.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Default overlap between consecutive windows in tokens.
pub const DEFAULT_CHUNK_OVERLAP: usize = 64;

/// Errors raised when a chunking configuration is invalid.
///
/// These are pre-run configuration failures: a chunker with an invalid
/// size/overlap combination is never constructed, so the indexing pipeline
/// rejects the configuration before touching any files.
#[derive(Debug, thiserror::Error)]
pub enum ChunkConfigError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// Deterministic whitespace tokenizer.
///
/// A token is a maximal run of non-whitespace bytes. The tokenizer reports
/// byte spans into the original text rather than owned strings, so callers
/// can slice windows out of the input without copying or re-joining.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    token_pattern: Regex,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            // Compile-time constant pattern, cannot fail.
            token_pattern: Regex::new(r"\S+").unwrap(),
        }
    }

    /// Byte spans of every token in `text`, in order.
    pub fn token_spans(&self, text: &str) -> Vec<Range<usize>> {
        self.token_pattern
            .find_iter(text)
            .map(|m| m.range())
            .collect()
    }

    /// Number of tokens in `text`.
    pub fn count_tokens(&self, text: &str) -> usize {
        self.token_pattern.find_iter(text).count()
    }

    /// Truncate `text` to at most `max_tokens` tokens.
    ///
    /// Returns the original slice when it is already within the limit.
    /// Truncation cuts at the end of the last kept token and is identical
    /// on every run for the same input, keeping embedding fingerprints
    /// computed over truncated text stable.
    pub fn truncate_to_tokens<'a>(&self, text: &'a str, max_tokens: usize) -> &'a str {
        if max_tokens == 0 {
            return "";
        }
        match self.token_pattern.find_iter(text).nth(max_tokens - 1) {
            Some(last) if last.end() < text.trim_end().len() => &text[..last.end()],
            _ => text,
        }
    }
}

/// A single window of tokens cut from a document.
///
/// `index` is zero-based and dense within the source document; the total
/// window count is the length of the vector returned by
/// [`TokenChunker::chunk`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenWindow {
    /// Position of this window within the document (0-based).
    pub index: usize,
    /// Number of tokens in this window.
    pub token_count: usize,
    /// Window text, sliced from the original input.
    pub text: String,
}

/// Splits text into overlapping token windows.
///
/// Windows start at token offsets `0, stride, 2 * stride, …` where
/// `stride = chunk_size - overlap`. Every window holds exactly
/// `chunk_size` tokens except the last, which takes whatever remains
/// (at least one token; a short tail is emitted, never dropped).
#[derive(Debug, Clone)]
pub struct TokenChunker {
    chunk_size: usize,
    overlap: usize,
    tokenizer: Tokenizer,
}

impl TokenChunker {
    /// Create a chunker, validating the size/overlap combination.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkConfigError> {
        if chunk_size == 0 {
            return Err(ChunkConfigError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkConfigError::OverlapTooLarge {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
            tokenizer: Tokenizer::new(),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Token distance between the starts of consecutive windows.
    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Split `text` into ordered token windows.
    ///
    /// Empty or whitespace-only input produces no windows. Identical text
    /// and configuration always produce identical output.
    pub fn chunk(&self, text: &str) -> Vec<TokenWindow> {
        let spans = self.tokenizer.token_spans(text);
        if spans.is_empty() {
            return Vec::new();
        }

        let mut windows = Vec::new();
        let mut start = 0;
        while start < spans.len() {
            let end = (start + self.chunk_size).min(spans.len());
            let byte_range = spans[start].start..spans[end - 1].end;
            windows.push(TokenWindow {
                index: windows.len(),
                token_count: end - start,
                text: text[byte_range].to_string(),
            });
            start += self.stride();
        }
        windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn window_sizes_and_offsets() {
        let chunker = TokenChunker::new(4, 1).unwrap();
        let text = words(11);
        let windows = chunker.chunk(&text);

        // Offsets 0, 3, 6, 9 with stride 3; final window takes the rest.
        assert_eq!(windows.len(), 4);
        for (i, window) in windows.iter().enumerate() {
            assert_eq!(window.index, i);
        }
        assert_eq!(
            windows.iter().map(|w| w.token_count).collect::<Vec<_>>(),
            vec![4, 4, 4, 2]
        );
        assert!(windows[0].text.starts_with("w0 "));
        assert!(windows[1].text.starts_with("w3 "));
        assert!(windows[2].text.starts_with("w6 "));
        assert_eq!(windows[3].text, "w9 w10");
    }

    #[test]
    fn all_windows_full_except_last() {
        let chunker = TokenChunker::new(8, 2).unwrap();
        let windows = chunker.chunk(&words(100));
        let (last, rest) = windows.split_last().unwrap();
        assert!(rest.iter().all(|w| w.token_count == 8));
        assert!(last.token_count >= 1 && last.token_count <= 8);
    }

    #[test]
    fn short_text_yields_single_window() {
        let chunker = TokenChunker::new(512, 64).unwrap();
        let windows = chunker.chunk("just a few tokens");
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].token_count, 4);
        assert_eq!(windows[0].text, "just a few tokens");
    }

    #[test]
    fn empty_and_whitespace_input() {
        let chunker = TokenChunker::new(4, 1).unwrap();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n\t  ").is_empty());
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        assert!(matches!(
            TokenChunker::new(4, 4),
            Err(ChunkConfigError::OverlapTooLarge { .. })
        ));
        assert!(matches!(
            TokenChunker::new(4, 9),
            Err(ChunkConfigError::OverlapTooLarge { .. })
        ));
        assert!(matches!(
            TokenChunker::new(0, 0),
            Err(ChunkConfigError::ZeroChunkSize)
        ));
    }

    #[test]
    fn chunking_is_deterministic() {
        let chunker = TokenChunker::new(5, 2).unwrap();
        let text = words(37);
        assert_eq!(chunker.chunk(&text), chunker.chunk(&text));
    }

    #[test]
    fn windows_preserve_interior_whitespace() {
        let chunker = TokenChunker::new(3, 0).unwrap();
        let text = "alpha  beta\n\ngamma delta";
        let windows = chunker.chunk(text);
        assert_eq!(windows[0].text, "alpha  beta\n\ngamma");
        assert_eq!(windows[1].text, "delta");
    }

    #[test]
    fn truncation_is_deterministic_and_bounded() {
        let tokenizer = Tokenizer::new();
        let text = words(20);

        let once = tokenizer.truncate_to_tokens(&text, 7);
        let twice = tokenizer.truncate_to_tokens(once, 7);
        assert_eq!(once, twice);
        assert_eq!(tokenizer.count_tokens(once), 7);

        // Under the limit: untouched.
        assert_eq!(tokenizer.truncate_to_tokens(&text, 50), text.as_str());
        assert_eq!(tokenizer.truncate_to_tokens(&text, 0), "");
    }

    #[test]
    fn token_counting() {
        let tokenizer = Tokenizer::new();
        assert_eq!(tokenizer.count_tokens(""), 0);
        assert_eq!(tokenizer.count_tokens("one"), 1);
        assert_eq!(tokenizer.count_tokens("  spaced   out\ttokens\n"), 3);
    }
}
