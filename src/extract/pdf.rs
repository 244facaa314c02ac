//! PDF extraction, one text unit per page

use super::text::normalize_whitespace;
use crate::error::{Error, Result};
use std::path::Path;
use tracing::debug;

/// Extract page texts from a PDF file.
///
/// pdf-extract renders the whole document with form feeds between pages;
/// splitting on them recovers page granularity.
pub fn extract_pdf(path: &Path) -> Result<Vec<String>> {
    let raw = pdf_extract::extract_text(path)
        .map_err(|e| Error::ExtractionFailed(format!("PDF extraction failed: {}", e)))?;

    let pages = split_pages(&raw);
    debug!(pages = pages.len(), path = %path.display(), "Extracted PDF pages");
    Ok(pages)
}

/// Split form-feed-delimited page text into normalized non-empty pages
pub fn split_pages(raw: &str) -> Vec<String> {
    raw.split('\u{c}')
        .map(normalize_whitespace)
        .filter(|p| !p.is_empty())
        .collect()
}
