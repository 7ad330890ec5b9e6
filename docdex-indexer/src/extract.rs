//! Content extraction contract.
//!
//! Per-format parsing (docx, pdf, xlsx, pptx, …) is an external
//! collaborator: the pipeline only consumes this trait. The bundled
//! [`PlainTextExtractor`] covers text-like formats and is what the tests
//! and the CLI use; richer extractors plug in behind the same trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Errors raised while extracting content or metadata from a file.
///
/// Extraction failures are per-file: the pipeline records the file as
/// failed and moves on, they never abort a directory run.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported file type: {extension}")]
    Unsupported { extension: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Malformed { path: PathBuf, message: String },
}

/// File metadata attached to every uploaded document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileMetadata {
    /// File name including extension.
    pub name: String,
    /// Absolute path as a string.
    pub path: String,
    /// Lowercased extension with leading dot (e.g. `.docx`).
    pub extension: String,
    /// Size in bytes.
    pub size: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    /// Document title when the format carries one; file stem otherwise.
    pub title: Option<String>,
    /// Document author when the format carries one.
    pub author: Option<String>,
}

/// Contract for per-format content extraction.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract the full text content of a file.
    async fn extract_text(&self, path: &Path) -> Result<String, ExtractError>;

    /// Extract filesystem and document metadata for a file.
    async fn extract_metadata(&self, path: &Path) -> Result<FileMetadata, ExtractError>;
}

/// Extractor for plain-text formats (txt, md, csv, log, …).
///
/// Reads the file as UTF-8 (lossily) and derives metadata from the
/// filesystem. The title falls back to the file stem.
#[derive(Debug, Default, Clone)]
pub struct PlainTextExtractor;

#[async_trait]
impl Extractor for PlainTextExtractor {
    async fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn extract_metadata(&self, path: &Path) -> Result<FileMetadata, ExtractError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|source| ExtractError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = file_extension(path);
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned());

        Ok(FileMetadata {
            name,
            path: path.to_string_lossy().into_owned(),
            extension,
            size: meta.len(),
            created: meta.created().ok().map(DateTime::<Utc>::from),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            title,
            author: None,
        })
    }
}

/// Lowercased extension with leading dot, empty string when absent.
pub fn file_extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn extracts_text_and_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, "meeting notes\nsecond line")
            .await
            .unwrap();

        let extractor = PlainTextExtractor;
        let text = extractor.extract_text(&path).await.unwrap();
        assert_eq!(text, "meeting notes\nsecond line");

        let meta = extractor.extract_metadata(&path).await.unwrap();
        assert_eq!(meta.name, "notes.txt");
        assert_eq!(meta.extension, ".txt");
        assert_eq!(meta.title.as_deref(), Some("notes"));
        assert_eq!(meta.size, 25);
        assert!(meta.modified.is_some());
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let extractor = PlainTextExtractor;
        let err = extractor
            .extract_text(Path::new("/nonexistent/nope.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }));
    }

    #[test]
    fn extension_normalization() {
        assert_eq!(file_extension(Path::new("a/b/Report.DOCX")), ".docx");
        assert_eq!(file_extension(Path::new("README")), "");
    }
}
