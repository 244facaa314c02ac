//! Chunk normalization
//!
//! Rewrites each raw extracted unit into self-contained prose suitable as
//! retrieval context. The lossiness guard is the correctness property here:
//! whenever the rewrite loses content, the original text wins.

use crate::llm::LlmClient;
use tracing::{debug, warn};

/// Rewrites below this share of the input's non-whitespace characters are
/// considered lossy and discarded.
pub const MIN_CONTENT_RATIO: f64 = 0.9;

const SYSTEM_PROMPT: &str = "You rewrite raw text extracted from documents into well-formed, \
self-contained prose. Preserve 100% of the factual content: every name, number, date, and \
claim from the input must appear in the output. Do not summarize, do not add commentary, \
do not invent content. Fix broken line wrapping, hyphenation, and artifacts from extraction. \
Output only the rewritten text.";

/// Chunk normalizer backed by an LLM completion
pub struct ChunkNormalizer<'a> {
    llm: &'a LlmClient,
}

impl<'a> ChunkNormalizer<'a> {
    pub fn new(llm: &'a LlmClient) -> Self {
        Self { llm }
    }

    /// Normalize one unit. Never fails: on a lossy rewrite or any LLM
    /// error the original unit is returned unchanged.
    pub async fn normalize(&self, unit: &str, document_title: &str, unit_index: usize) -> String {
        let prompt = format!(
            "Document: {}\nSection {}:\n\n{}",
            document_title,
            unit_index + 1,
            unit
        );

        match self.llm.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(rewritten) => {
                if looks_lossy(unit, &rewritten) {
                    debug!(
                        unit_index,
                        "Normalized output lost content, keeping original"
                    );
                    unit.to_string()
                } else {
                    rewritten
                }
            }
            Err(e) => {
                warn!(unit_index, error = %e, "Normalization failed, keeping original");
                unit.to_string()
            }
        }
    }
}

/// Count characters that are not whitespace
fn non_whitespace_len(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// Naive sentence count: terminator runs (. ! ?) followed by space or EOF
fn sentence_count(text: &str) -> usize {
    let mut count = 0;
    let mut in_terminator = false;
    for c in text.chars() {
        if matches!(c, '.' | '!' | '?') {
            in_terminator = true;
        } else if in_terminator {
            count += 1;
            in_terminator = false;
        }
    }
    if in_terminator {
        count += 1;
    }
    count
}

/// The lossiness guard: true when the candidate rewrite should be rejected
pub fn looks_lossy(original: &str, candidate: &str) -> bool {
    let original_len = non_whitespace_len(original);
    let candidate_len = non_whitespace_len(candidate);

    if original_len == 0 {
        return false;
    }
    if (candidate_len as f64) < (original_len as f64) * MIN_CONTENT_RATIO {
        return true;
    }

    let min_sentences = (sentence_count(original) / 2).max(1);
    sentence_count(candidate) < min_sentences
}
