use std::fs;
use std::path::Path;

use super::index::Document;

/// Loads the knowledge-base corpus. When the file is missing or unreadable the
/// built-in placeholder set is returned instead, so the corpus is never empty
/// and the index build never sees zero documents.
pub fn load_documents(path: &Path) -> Vec<Document> {
    match fs::read_to_string(path) {
        Ok(content) => {
            tracing::info!("Loaded knowledge base from {}", path.display());
            vec![Document::new("sample_document", content)
                .with_metadata("type", "documentation")
                .with_metadata("source", path.display().to_string())]
        }
        Err(err) => {
            tracing::warn!(
                "Knowledge base file {} not readable ({}); using placeholder documents",
                path.display(),
                err
            );
            placeholder_documents()
        }
    }
}

fn placeholder_documents() -> Vec<Document> {
    vec![
        Document::new(
            "system_prompt",
            "Your complete system prompt content here...",
        )
        .with_metadata("type", "system_prompt"),
        Document::new("projects_info", "Information about projects...")
            .with_metadata("type", "project"),
    ]
}
