//! Fact extraction
//!
//! Asks the LLM for atomic statements and plausible user questions about a
//! chunk, then runs the response through a tolerant line parser with a
//! validator so malformed output is dropped and logged instead of silently
//! polluting the knowledge base.
//!
//! A chunk that fails fact extraction contributes zero facts; it never
//! aborts the document pipeline.

use crate::llm::LlmClient;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Items shorter than this (in characters) after cleaning are discarded
pub const MIN_FACT_LENGTH: usize = 10;

const SYSTEM_PROMPT: &str = "You extract knowledge from document passages for a retrieval \
system. Given a passage, emit atomic, self-contained statements of fact it supports, and \
plausible questions a user might ask that the passage answers. One item per line. Each item \
must stand alone without the passage. Do not use category labels, headings, numbering, or \
bullet points. Do not add commentary.";

fn list_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // numbering ("1.", "2)", "(3)") and bullets ("-", "*", "•")
    RE.get_or_init(|| Regex::new(r"^\s*(?:\(?\d+[.)]\s*|[-*•]\s+)").expect("valid regex"))
}

/// One atomic statement or question derived from a chunk
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    pub content: String,
    pub source_chunk: i32,
}

/// Fact extractor backed by an LLM completion
pub struct FactExtractor<'a> {
    llm: &'a LlmClient,
}

impl<'a> FactExtractor<'a> {
    pub fn new(llm: &'a LlmClient) -> Self {
        Self { llm }
    }

    /// Extract facts for one chunk. Absorbs LLM failures: returns an empty
    /// list rather than an error.
    pub async fn extract_facts(&self, chunk_text: &str, chunk_position: i32) -> Vec<Fact> {
        let response = match self.llm.complete(SYSTEM_PROMPT, chunk_text).await {
            Ok(text) => text,
            Err(e) => {
                warn!(chunk_position, error = %e, "Fact extraction failed, chunk contributes no facts");
                return Vec::new();
            }
        };

        let facts: Vec<Fact> = parse_fact_lines(&response)
            .into_iter()
            .map(|content| Fact {
                content,
                source_chunk: chunk_position,
            })
            .collect();

        debug!(chunk_position, count = facts.len(), "Extracted facts");
        facts
    }
}

/// Parse LLM output into clean fact strings.
///
/// Splits on newlines, strips numbering/bullets/quote wrapping, drops
/// category-marker lines and anything below the length threshold.
pub fn parse_fact_lines(response: &str) -> Vec<String> {
    response
        .lines()
        .filter_map(|line| {
            let cleaned = clean_line(line);
            if cleaned.is_empty() {
                return None;
            }
            if is_category_marker(&cleaned) {
                debug!(line = %cleaned, "Dropping category marker line");
                return None;
            }
            if cleaned.chars().count() < MIN_FACT_LENGTH {
                warn!(line = %cleaned, "Dropping too-short extracted item");
                return None;
            }
            if cleaned.contains('<') && cleaned.contains('>') {
                warn!(line = %cleaned, "Dropping item with leftover markup");
                return None;
            }
            Some(cleaned)
        })
        .collect()
}

/// Strip list numbering, bullets, markdown emphasis, and wrapping quotes
fn clean_line(line: &str) -> String {
    let stripped = list_prefix_re().replace(line.trim(), "");
    stripped
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '“' || c == '”' || c == '*')
        .trim()
        .to_string()
}

/// Residual category markers: short label lines like "Statements:" or "Questions"
fn is_category_marker(line: &str) -> bool {
    let bare = line.trim_end_matches(':').trim();
    if bare.is_empty() {
        return true;
    }
    let word_count = bare.split_whitespace().count();
    let known_label = matches!(
        bare.to_lowercase().as_str(),
        "statements" | "statement" | "facts" | "fact" | "questions" | "question" | "answers"
    );
    known_label || (line.ends_with(':') && word_count <= 3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_strips_numbering_and_bullets() {
        let response = "1. The factory opened in 1962.\n\
                        2) It employed four hundred workers.\n\
                        - Output peaked during 1975.\n\
                        * When did the factory open?";
        let facts = parse_fact_lines(response);
        assert_eq!(
            facts,
            vec![
                "The factory opened in 1962.",
                "It employed four hundred workers.",
                "Output peaked during 1975.",
                "When did the factory open?",
            ]
        );
    }

    #[test]
    fn test_parse_drops_category_markers() {
        let response = "Statements:\n\
                        The tower is 320 metres tall.\n\
                        **Questions**\n\
                        How tall is the tower?";
        let facts = parse_fact_lines(response);
        assert_eq!(
            facts,
            vec!["The tower is 320 metres tall.", "How tall is the tower?"]
        );
    }

    #[test]
    fn test_parse_drops_short_items() {
        let response = "Yes.\nOk\nThe bridge carries two rail tracks.";
        let facts = parse_fact_lines(response);
        assert_eq!(facts, vec!["The bridge carries two rail tracks."]);
    }

    #[test]
    fn test_length_threshold_counts_chars_not_bytes() {
        // "café noté" is nine characters but eleven bytes
        let response = "café noté\nThe café opened in 1911.";
        let facts = parse_fact_lines(response);
        assert_eq!(facts, vec!["The café opened in 1911."]);
    }

    #[test]
    fn test_parse_strips_quote_wrapping() {
        let facts = parse_fact_lines("\"The canal opened to traffic in 1914.\"");
        assert_eq!(facts, vec!["The canal opened to traffic in 1914."]);
    }

    #[test]
    fn test_parse_drops_leftover_markup() {
        let response = "<item>The canal opened in 1914.</item>\nThe canal opened in 1914.";
        let facts = parse_fact_lines(response);
        assert_eq!(facts, vec!["The canal opened in 1914."]);
    }

    #[test]
    fn test_parse_empty_response() {
        assert!(parse_fact_lines("").is_empty());
        assert!(parse_fact_lines("\n\n  \n").is_empty());
    }

    #[tokio::test]
    async fn test_extract_facts_absorbs_llm_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = LlmConfig {
            endpoint: server.uri(),
            ..LlmConfig::default()
        };
        let llm = crate::llm::LlmClient::new(&config).unwrap();
        let extractor = FactExtractor::new(&llm);

        let facts = extractor.extract_facts("Some chunk text here.", 2).await;
        assert!(facts.is_empty());
    }

    #[tokio::test]
    async fn test_extract_facts_tags_source_chunk() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "The depot handles freight only.\nWhat does the depot handle?",
                "done": true
            })))
            .mount(&server)
            .await;

        let config = LlmConfig {
            endpoint: server.uri(),
            ..LlmConfig::default()
        };
        let llm = crate::llm::LlmClient::new(&config).unwrap();
        let extractor = FactExtractor::new(&llm);

        let facts = extractor.extract_facts("chunk", 3).await;
        assert_eq!(facts.len(), 2);
        assert!(facts.iter().all(|f| f.source_chunk == 3));
    }
}
