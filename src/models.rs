//! Core data models shared by ingestion, retrieval, and explanation.

use serde::{Deserialize, Serialize};

/// A corpus file, as persisted in the docstore.
///
/// `id` and `source` are the file's path relative to the parent of its
/// corpus root (e.g. `regulations/kyc.txt`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source: String,
    pub text: String,
}

/// A ranked passage returned by the retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub source: String,
    /// Whitespace-collapsed prefix of `text`, at most [`PREVIEW_CHARS`] characters.
    pub preview: String,
    /// Cosine similarity between the query and the document.
    pub score: f32,
    pub text: String,
}

/// A reference shown alongside an explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub preview: String,
}

impl From<&RetrievalResult> for Citation {
    fn from(r: &RetrievalResult) -> Self {
        Self {
            source: r.source.clone(),
            preview: r.preview.clone(),
        }
    }
}

pub const PREVIEW_CHARS: usize = 200;

/// Collapse every run of whitespace to one space and keep the first
/// [`PREVIEW_CHARS`] characters.
pub fn make_preview(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_collapses_newlines() {
        let p = make_preview("Lenders must\n\nverify   income.\t Always.");
        assert_eq!(p, "Lenders must verify income. Always.");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let text = "é".repeat(350);
        let p = make_preview(&text);
        assert_eq!(p.chars().count(), PREVIEW_CHARS);
    }

    #[test]
    fn test_short_text_preview_is_full_text() {
        let text = "Lenders must verify income before disbursing loans.";
        assert_eq!(make_preview(text), text);
    }
}
