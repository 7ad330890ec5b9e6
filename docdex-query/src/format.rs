//! Presentation helpers for search results. Layered on top of the query
//! engine contract; nothing here affects ranking.

use docdex_indexer::backend::SearchHit;

/// Render results for terminal display.
pub fn format_results(hits: &[SearchHit], show_scores: bool) -> String {
    if hits.is_empty() {
        return "No results found.".to_string();
    }

    let mut output = Vec::new();
    output.push(format!("Found {} results:", hits.len()));
    output.push("=".repeat(72));

    for (i, hit) in hits.iter().enumerate() {
        output.push(format!("\n{}. {}", i + 1, hit.name));
        output.push(format!(
            "   Chunk: {}/{}",
            hit.chunk_index + 1,
            hit.total_chunks
        ));
        output.push(format!("   Path: {}", hit.path));
        if let Some(modified) = &hit.modified {
            output.push(format!("   Modified: {}", modified.to_rfc3339()));
        }
        if show_scores {
            output.push(format!("   Score: {:.4}", hit.score));
            if let Some(reranker) = hit.reranker_score {
                output.push(format!("   Reranker Score: {reranker:.4}"));
            }
        }
        if !hit.content.is_empty() {
            let preview: String = hit.content.chars().take(200).collect();
            output.push(format!("   Preview: {}...", preview.replace('\n', " ")));
        }
    }

    output.push(String::new());
    output.push("=".repeat(72));
    output.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_results() {
        assert_eq!(format_results(&[], true), "No results found.");
    }

    #[test]
    fn includes_scores_when_requested() {
        let hit = SearchHit {
            id: "1".into(),
            name: "report.docx".into(),
            path: "/docs/report.docx".into(),
            chunk_index: 0,
            total_chunks: 3,
            modified: None,
            content: "quarterly figures".into(),
            score: 1.5,
            reranker_score: Some(3.25),
        };

        let with_scores = format_results(&[hit.clone()], true);
        assert!(with_scores.contains("report.docx"));
        assert!(with_scores.contains("Chunk: 1/3"));
        assert!(with_scores.contains("Score: 1.5000"));
        assert!(with_scores.contains("Reranker Score: 3.2500"));

        let without_scores = format_results(&[hit], false);
        assert!(!without_scores.contains("Score:"));
    }
}
