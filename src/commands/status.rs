//! Status command implementation

use crate::config::Config;
use crate::error::Result;
use crate::meta::MetaDb;
use crate::pipeline::{status_report, StatusReport};
use crate::progress;
use std::time::Duration;
use tracing::info;

/// Get the processing status of one document
pub async fn cmd_status(config: &Config, db: &MetaDb, document_id: &str) -> Result<StatusReport> {
    status_report(db, document_id, config.pipeline.staleness_secs).await
}

/// Poll the status row until it reaches a terminal state or goes stale,
/// driving a progress bar. Returns the last observed report.
pub async fn wait_for_terminal(
    config: &Config,
    db: &MetaDb,
    document_id: &str,
) -> Result<StatusReport> {
    let bar = progress::add_pipeline_bar();
    let poll = Duration::from_secs(config.pipeline.status_poll_secs.max(1));

    let report = loop {
        let report = status_report(db, document_id, config.pipeline.staleness_secs).await?;
        bar.set_position(report.progress.clamp(0, 100) as u64);
        bar.set_message(report.state.to_string());

        if report.is_terminal() {
            break report;
        }
        if report.stale {
            info!(document_id, "Status row went stale, stopping watch");
            break report;
        }
        tokio::time::sleep(poll).await;
    };

    bar.finish_and_clear();
    Ok(report)
}

/// Print a status report to console
pub fn print_status_report(report: &StatusReport) {
    println!("\nDocument: {} ({})", report.document_id, report.file_name);
    println!("  State: {}", report.state);
    println!("  Progress: {}%", report.progress);
    if let Some(error) = &report.error_message {
        println!("  Error: {}", error);
    }
    if report.stale {
        println!("  ⚠ Status is stale; the ingestion task may have died");
    }
    println!("  Chunks: {}", report.chunk_count);
    println!("  Knowledge items: {}", report.knowledge_item_count);
    println!("  Updated: {}", report.updated_at);
}
