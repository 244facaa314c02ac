//! Status reporting
//!
//! Assembles a client-facing view of a document's processing state from
//! the status row plus derived counters. Staleness is inferred from the
//! row's age: a detached ingestion task that died cannot report failure
//! itself, so an old non-terminal row is the only evidence.

use crate::error::{Error, Result};
use crate::meta::{MetaDb, ProcessingState};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Client-facing status for one document
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub document_id: String,
    pub file_name: String,
    pub state: ProcessingState,
    pub progress: i64,
    pub error_message: Option<String>,
    pub chunk_count: i64,
    pub knowledge_item_count: i64,
    pub updated_at: String,
    /// True when a non-terminal row has not been touched for longer than
    /// the configured staleness window
    pub stale: bool,
}

impl StatusReport {
    /// Whether processing (either lifecycle) has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Build a status report for a document
pub async fn status_report(
    db: &MetaDb,
    document_id: &str,
    staleness_secs: u64,
) -> Result<StatusReport> {
    let document = db
        .get_document(document_id)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(document_id.to_string()))?;

    let row = db
        .get_status(document_id)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(document_id.to_string()))?;

    let state = row.state()?;
    let stale = !state.is_terminal() && age_secs(&row.updated_at) > staleness_secs as i64;

    Ok(StatusReport {
        document_id: document.id,
        file_name: document.file_name,
        state,
        progress: row.progress,
        error_message: row.error_message,
        chunk_count: db.chunk_count(document_id).await?,
        knowledge_item_count: db.knowledge_item_count(document_id).await?,
        updated_at: row.updated_at,
        stale,
    })
}

pub(crate) fn age_secs(updated_at: &str) -> i64 {
    DateTime::parse_from_rfc3339(updated_at)
        .map(|t| (Utc::now() - t.with_timezone(&Utc)).num_seconds())
        .unwrap_or(i64::MAX)
}
