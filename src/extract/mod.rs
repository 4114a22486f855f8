#[cfg(test)]
mod tests;

use fancy_regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

use crate::chunking::{PARAGRAPH_BREAK, split_on};
use crate::{RagError, Result};

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// File extensions read as plain text
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "md", "markdown"];

/// Collapse every whitespace run to one space and trim
#[inline]
pub fn clean_text(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Clean each paragraph separately, keeping blank-line boundaries
#[inline]
pub fn clean_paragraphs(text: &str) -> String {
    split_on(&PARAGRAPH_BREAK, text)
        .into_iter()
        .map(clean_text)
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[inline]
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// Read a plain-text document and return its cleaned text
///
/// Invalid UTF-8 sequences are replaced rather than rejected.
#[inline]
pub fn read_document(path: &Path) -> Result<String> {
    if !is_supported(path) {
        return Err(RagError::Extraction(format!(
            "Unsupported file format: {}",
            path.display()
        )));
    }

    let bytes = std::fs::read(path)?;
    let text = clean_paragraphs(&String::from_utf8_lossy(&bytes));
    debug!("Extracted {} characters from {}", text.len(), path.display());
    Ok(text)
}
