//! Ingest command implementation

use super::status::wait_for_terminal;
use crate::config::Config;
use crate::error::Result;
use crate::llm::LlmClient;
use crate::meta::MetaDb;
use crate::pipeline::{IngestOptions, Pipeline, StatusReport};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// What the ingest command hands back to the caller
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub document_id: String,
    pub file_name: String,
    pub knowledge_base_id: String,
    pub deduplicated: bool,
    /// Final status when the command waited for completion
    pub report: Option<StatusReport>,
}

/// Upload a file and start the ingestion pipeline. With `wait` the call
/// blocks until processing reaches a terminal state; otherwise it returns
/// as soon as the upload is accepted.
pub async fn cmd_ingest(
    config: &Config,
    db: &MetaDb,
    path: &Path,
    options: IngestOptions,
    wait: bool,
) -> Result<IngestSummary> {
    let pipeline = Pipeline::new(db.clone(), config.clone());
    let receipt = pipeline.begin_document(path, &options).await?;

    let mut summary = IngestSummary {
        document_id: receipt.document.id.clone(),
        file_name: receipt.document.file_name.clone(),
        knowledge_base_id: receipt.knowledge_base_id.clone(),
        deduplicated: receipt.deduplicated,
        report: None,
    };

    if receipt.deduplicated {
        info!(document_id = %receipt.document.id, "Content already ingested");
        return Ok(summary);
    }

    // An unreachable LLM doesn't block ingestion (normalization falls back
    // to the raw text and no facts come out), but flag it up front.
    let llm = LlmClient::new(&config.llm)?;
    if !llm.is_available().await {
        warn!(
            endpoint = %config.llm.endpoint,
            "LLM backend unreachable; chunks will be stored unnormalized and no facts extracted"
        );
    }

    pipeline.spawn_ingest(receipt.document, receipt.knowledge_base_id);

    if wait {
        summary.report = Some(wait_for_terminal(config, db, &summary.document_id).await?);
    }

    Ok(summary)
}

/// Print an ingest summary to console
pub fn print_ingest_summary(summary: &IngestSummary) {
    if summary.deduplicated {
        println!(
            "✓ '{}' already ingested as document {}",
            summary.file_name, summary.document_id
        );
        return;
    }

    println!("✓ Upload accepted: {}", summary.file_name);
    println!("  Document: {}", summary.document_id);
    println!("  Knowledge base: {}", summary.knowledge_base_id);

    match &summary.report {
        Some(report) => {
            println!("  Final state: {} ({}%)", report.state, report.progress);
            if let Some(error) = &report.error_message {
                println!("  Error: {}", error);
            }
            println!(
                "  Chunks: {}, knowledge items: {}",
                report.chunk_count, report.knowledge_item_count
            );
        }
        None => {
            println!(
                "  Processing in background; check with 'factmill status {}'",
                summary.document_id
            );
        }
    }
}
