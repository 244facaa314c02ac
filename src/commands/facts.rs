//! Facts command implementation
//!
//! Re-runs fact extraction against the persisted chunks of an already
//! ingested document, without re-extracting or re-normalizing the file.

use super::status::wait_for_terminal;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use crate::pipeline::{Pipeline, StatusReport};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct FactsSummary {
    pub document_id: String,
    pub knowledge_base_id: String,
    pub report: Option<StatusReport>,
}

/// Re-run fact extraction for a document. With `wait` the call runs the
/// stages inline and returns the terminal status; otherwise the work is
/// detached and only the status row reports the outcome.
pub async fn cmd_facts(
    config: &Config,
    db: &MetaDb,
    document_id: &str,
    knowledge_base_id: Option<String>,
    wait: bool,
) -> Result<FactsSummary> {
    let document = db
        .get_document(document_id)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(document_id.to_string()))?;

    let knowledge_base_id = match knowledge_base_id {
        Some(id) => match db.get_knowledge_base(&id).await? {
            Some(kb) => kb.id,
            None => return Err(Error::KnowledgeBaseNotFound(id)),
        },
        None => db
            .get_knowledge_base_by_name(&document.user_id, "default")
            .await?
            .map(|kb| kb.id)
            .ok_or_else(|| Error::KnowledgeBaseNotFound("default".to_string()))?,
    };

    let pipeline = Pipeline::new(db.clone(), config.clone());
    let mut summary = FactsSummary {
        document_id: document_id.to_string(),
        knowledge_base_id: knowledge_base_id.clone(),
        report: None,
    };

    if wait {
        pipeline.process_facts(document_id, &knowledge_base_id).await;
        summary.report = Some(wait_for_terminal(config, db, document_id).await?);
    } else {
        let id = document_id.to_string();
        tokio::spawn(async move {
            pipeline.process_facts(&id, &knowledge_base_id).await;
        });
        info!(document_id, "Fact re-extraction started in background");
    }

    Ok(summary)
}

/// Print a facts summary to console
pub fn print_facts_summary(summary: &FactsSummary) {
    match &summary.report {
        Some(report) => {
            println!(
                "✓ Fact extraction finished for {}: {} ({}%)",
                summary.document_id, report.state, report.progress
            );
            if let Some(error) = &report.error_message {
                println!("  Error: {}", error);
            }
            println!("  Knowledge items: {}", report.knowledge_item_count);
        }
        None => {
            println!(
                "✓ Fact extraction started; check with 'factmill status {}'",
                summary.document_id
            );
        }
    }
}
