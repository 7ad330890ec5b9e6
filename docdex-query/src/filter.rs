//! Structured search filters and their translation to the backend's
//! filter-expression syntax.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::engine::QueryError;

/// Document fields that accept arbitrary equality filters.
///
/// Anything else fails with [`QueryError::InvalidFilter`] instead of being
/// silently dropped; a filter the backend would ignore is worse than an
/// error.
const FILTERABLE_FIELDS: &[&str] = &["extension", "name", "title", "author", "filePath", "size"];

/// Structured filter request attached to a search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// File extension, with or without the leading dot.
    pub extension: Option<String>,
    /// Lower bound on the document's modified time.
    pub modified_from: Option<DateTime<Utc>>,
    /// Upper bound on the document's modified time.
    pub modified_to: Option<DateTime<Utc>>,
    /// Document author.
    pub author: Option<String>,
    /// Additional field equality predicates on filterable fields.
    pub fields: Vec<(String, String)>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self.extension.is_none()
            && self.modified_from.is_none()
            && self.modified_to.is_none()
            && self.author.is_none()
            && self.fields.is_empty()
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_modified_from(mut self, from: DateTime<Utc>) -> Self {
        self.modified_from = Some(from);
        self
    }

    pub fn with_modified_to(mut self, to: DateTime<Utc>) -> Self {
        self.modified_to = Some(to);
        self
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((field.into(), value.into()));
        self
    }
}

/// Translate a structured filter into the backend's expression syntax.
///
/// Predicates are combined with `and`; string literals are single-quoted
/// with embedded quotes doubled. Returns `None` for an empty filter.
pub fn build_filter_expression(filter: &SearchFilter) -> Result<Option<String>, QueryError> {
    let mut clauses = Vec::new();

    if let Some(extension) = &filter.extension {
        let normalized = normalize_extension(extension);
        clauses.push(format!("extension eq '{}'", escape_literal(&normalized)));
    }
    if let Some(from) = &filter.modified_from {
        clauses.push(format!(
            "modifiedDateTime ge {}",
            from.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }
    if let Some(to) = &filter.modified_to {
        clauses.push(format!(
            "modifiedDateTime le {}",
            to.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }
    if let Some(author) = &filter.author {
        clauses.push(format!("author eq '{}'", escape_literal(author)));
    }
    for (field, value) in &filter.fields {
        if !FILTERABLE_FIELDS.contains(&field.as_str()) {
            return Err(QueryError::InvalidFilter {
                field: field.clone(),
            });
        }
        clauses.push(format!("{field} eq '{}'", escape_literal(value)));
    }

    Ok(if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" and "))
    })
}

/// Double embedded single quotes, the expression syntax's escape form.
fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

fn normalize_extension(extension: &str) -> String {
    let lower = extension.to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn combines_predicates_with_and() {
        let filter = SearchFilter::default()
            .with_extension("pdf")
            .with_author("Jane Doe")
            .with_modified_from(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        let expr = build_filter_expression(&filter).unwrap().unwrap();
        assert_eq!(
            expr,
            "extension eq '.pdf' and modifiedDateTime ge 2024-01-01T00:00:00Z and author eq 'Jane Doe'"
        );
    }

    #[test]
    fn quotes_are_escaped() {
        let filter = SearchFilter::default().with_author("O'Brien");
        let expr = build_filter_expression(&filter).unwrap().unwrap();
        assert_eq!(expr, "author eq 'O''Brien'");
    }

    #[test]
    fn extension_is_normalized() {
        let filter = SearchFilter::default().with_extension("DOCX");
        let expr = build_filter_expression(&filter).unwrap().unwrap();
        assert_eq!(expr, "extension eq '.docx'");
    }

    #[test]
    fn unknown_field_is_rejected() {
        let filter = SearchFilter::default().with_field("contentVector", "x");
        let err = build_filter_expression(&filter).unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter { field } if field == "contentVector"));
    }

    #[test]
    fn known_extra_field_is_accepted() {
        let filter = SearchFilter::default().with_field("name", "report.docx");
        let expr = build_filter_expression(&filter).unwrap().unwrap();
        assert_eq!(expr, "name eq 'report.docx'");
    }

    #[test]
    fn empty_filter_builds_nothing() {
        assert_eq!(build_filter_expression(&SearchFilter::default()).unwrap(), None);
    }
}
