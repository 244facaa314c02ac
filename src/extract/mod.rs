//! Text extraction from uploaded files
//!
//! Converts a raw file into one ordered text unit per logical page or
//! section. Paginated formats (PDF) yield one unit per page, DOCX one unit
//! per paragraph, flat text formats a single unit.

mod docx;
#[cfg(feature = "pdf")]
mod pdf;
mod text;

pub use text::{is_binary_content, normalize_whitespace};

use crate::error::{Error, Result};
use std::path::Path;
use tracing::debug;

/// File formats the extractor accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    PlainText,
    Markdown,
    Pdf,
    Docx,
}

impl FileFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("txt") | Some("text") => Some(FileFormat::PlainText),
            Some("md") | Some("markdown") | Some("mdx") => Some(FileFormat::Markdown),
            Some("pdf") => Some(FileFormat::Pdf),
            Some("docx") => Some(FileFormat::Docx),
            _ => None,
        }
    }

    /// MIME-ish label stored on the document record
    pub fn label(&self) -> &'static str {
        match self {
            FileFormat::PlainText => "text/plain",
            FileFormat::Markdown => "text/markdown",
            FileFormat::Pdf => "application/pdf",
            FileFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

/// One extracted page or section, in document order
#[derive(Debug, Clone)]
pub struct TextUnit {
    pub index: usize,
    pub text: String,
}

/// Extract ordered text units from a file.
///
/// `on_progress` is called with (units_done, units_total) as units become
/// available so callers can surface partial progress.
pub fn extract<F>(path: &Path, mut on_progress: F) -> Result<Vec<TextUnit>>
where
    F: FnMut(usize, usize),
{
    let format = FileFormat::from_path(path).ok_or_else(|| {
        Error::UnsupportedFormat(
            path.extension()
                .and_then(|e| e.to_str())
                .unwrap_or("(no extension)")
                .to_string(),
        )
    })?;

    debug!(?format, path = %path.display(), "Extracting text units");

    let texts = match format {
        FileFormat::PlainText | FileFormat::Markdown => extract_flat_text(path)?,
        #[cfg(feature = "pdf")]
        FileFormat::Pdf => pdf::extract_pdf(path)?,
        #[cfg(not(feature = "pdf"))]
        FileFormat::Pdf => {
            return Err(Error::UnsupportedFormat(
                "pdf (crate built without the 'pdf' feature)".to_string(),
            ))
        }
        FileFormat::Docx => docx::extract_docx(path)?,
    };

    if texts.is_empty() {
        return Err(Error::ExtractionFailed(format!(
            "No text content in {}",
            path.display()
        )));
    }

    let total = texts.len();
    let units = texts
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            on_progress(index + 1, total);
            TextUnit { index, text }
        })
        .collect();

    Ok(units)
}

/// Flat text formats produce a single whitespace-normalized unit
fn extract_flat_text(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path)?;

    if is_binary_content(&bytes) {
        return Err(Error::ExtractionFailed(format!(
            "File does not look like text: {}",
            path.display()
        )));
    }

    let text = normalize_whitespace(&String::from_utf8_lossy(&bytes));
    if text.is_empty() {
        return Ok(Vec::new());
    }

    Ok(vec![text])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content).unwrap();
        path
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            FileFormat::from_path(Path::new("notes.txt")),
            Some(FileFormat::PlainText)
        );
        assert_eq!(
            FileFormat::from_path(Path::new("README.md")),
            Some(FileFormat::Markdown)
        );
        assert_eq!(
            FileFormat::from_path(Path::new("report.PDF")),
            Some(FileFormat::Pdf)
        );
        assert_eq!(
            FileFormat::from_path(Path::new("memo.docx")),
            Some(FileFormat::Docx)
        );
        assert_eq!(FileFormat::from_path(Path::new("tool.exe")), None);
        assert_eq!(FileFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_unsupported_extension_errors() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "tool.exe", b"MZ\x00\x01");

        let err = extract(&path, |_, _| {}).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_plain_text_single_unit() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "notes.txt", b"Hello   world.\n\n\nSecond paragraph.");

        let mut calls = Vec::new();
        let units = extract(&path, |done, total| calls.push((done, total))).unwrap();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].index, 0);
        assert_eq!(units[0].text, "Hello world.\n\nSecond paragraph.");
        assert_eq!(calls, vec![(1, 1)]);
    }

    #[test]
    fn test_markdown_treated_as_plain_text() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "doc.md", b"# Title\n\nSome *markdown* body.");

        let units = extract(&path, |_, _| {}).unwrap();
        assert_eq!(units.len(), 1);
        assert!(units[0].text.contains("# Title"));
    }

    #[test]
    fn test_empty_file_is_extraction_failure() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "empty.txt", b"   \n  ");

        let err = extract(&path, |_, _| {}).unwrap_err();
        assert!(matches!(err, Error::ExtractionFailed(_)));
    }

    #[test]
    fn test_binary_content_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "fake.txt", &[0x00, 0x01, 0x02, 0x03]);

        let err = extract(&path, |_, _| {}).unwrap_err();
        assert!(matches!(err, Error::ExtractionFailed(_)));
    }
}
