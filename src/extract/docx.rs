//! DOCX extraction, one text unit per paragraph
//!
//! Two strategies are attempted in a fixed order: a strict parse of
//! `word/document.xml` paragraph runs, then a lossy tag-strip of the whole
//! XML as a single unit. Extraction only fails after both strategies fail,
//! surfacing the last error.

use super::text::normalize_whitespace;
use crate::error::{Error, Result};
use regex::Regex;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

fn run_text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<w:t[^>]*>([^<]*)</w:t>").expect("valid regex"))
}

fn xml_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid regex"))
}

/// Extract paragraph texts from a DOCX file, trying strategies in order
pub fn extract_docx(path: &Path) -> Result<Vec<String>> {
    let document_xml = read_document_xml(path)?;

    let strategies: [(&str, fn(&str) -> Result<Vec<String>>); 2] = [
        ("paragraph-runs", parse_paragraphs),
        ("tag-strip", parse_whole_document),
    ];

    let mut last_err = None;
    for (name, strategy) in strategies {
        match strategy(&document_xml) {
            Ok(paragraphs) if !paragraphs.is_empty() => {
                debug!(strategy = name, paragraphs = paragraphs.len(), "DOCX extracted");
                return Ok(paragraphs);
            }
            Ok(_) => {
                warn!(strategy = name, "DOCX strategy produced no text");
                last_err = Some(Error::ExtractionFailed(format!(
                    "Strategy '{}' produced no text",
                    name
                )));
            }
            Err(e) => {
                warn!(strategy = name, error = %e, "DOCX strategy failed");
                last_err = Some(e);
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| Error::ExtractionFailed("No DOCX strategies available".to_string())))
}

/// Pull `word/document.xml` out of the DOCX zip container
fn read_document_xml(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| Error::ExtractionFailed(format!("Not a DOCX container: {}", e)))?;

    let mut entry = archive
        .by_name("word/document.xml")
        .map_err(|e| Error::ExtractionFailed(format!("Missing word/document.xml: {}", e)))?;

    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Strict strategy: split on paragraph close tags and join text runs
fn parse_paragraphs(xml: &str) -> Result<Vec<String>> {
    let paragraphs: Vec<String> = xml
        .split("</w:p>")
        .filter_map(|block| {
            let runs: Vec<&str> = run_text_re()
                .captures_iter(block)
                .filter_map(|c| c.get(1).map(|m| m.as_str()))
                .collect();
            if runs.is_empty() {
                return None;
            }
            let text = normalize_whitespace(&decode_entities(&runs.concat()));
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        })
        .collect();

    Ok(paragraphs)
}

/// Lossy strategy: strip every tag and return the whole document as one unit
fn parse_whole_document(xml: &str) -> Result<Vec<String>> {
    let stripped = xml_tag_re().replace_all(xml, " ");
    let text = normalize_whitespace(&decode_entities(&stripped));
    if text.is_empty() {
        Ok(Vec::new())
    } else {
        Ok(vec![text])
    }
}

/// Decode the XML entities that appear in WordprocessingML text runs
fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}
