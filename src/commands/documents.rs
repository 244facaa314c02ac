//! Document listing and removal

use crate::error::{Error, Result};
use crate::meta::MetaDb;
use clap_complete::Shell;
use serde::Serialize;
use tracing::{info, warn};

/// One document with its processing status and derived counts
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub title: Option<String>,
    pub created_at: String,
    pub status: Option<String>,
    pub progress: Option<i64>,
    pub chunk_count: i64,
    pub knowledge_item_count: i64,
}

/// List all documents in a workspace
pub async fn cmd_list_documents(db: &MetaDb, workspace_id: &str) -> Result<Vec<DocumentInfo>> {
    let documents = db.list_documents(workspace_id).await?;
    let mut result = Vec::with_capacity(documents.len());

    for doc in documents {
        let status = db.get_status(&doc.id).await?;
        result.push(DocumentInfo {
            chunk_count: db.chunk_count(&doc.id).await?,
            knowledge_item_count: db.knowledge_item_count(&doc.id).await?,
            id: doc.id,
            file_name: doc.file_name,
            file_type: doc.file_type,
            file_size: doc.file_size,
            title: doc.title,
            created_at: doc.created_at,
            progress: status.as_ref().map(|s| s.progress),
            status: status.map(|s| s.status),
        });
    }

    Ok(result)
}

/// Remove a document: its stored file, chunks, knowledge items, and
/// status row
pub async fn cmd_remove_document(db: &MetaDb, document_id: &str) -> Result<()> {
    let document = db
        .get_document(document_id)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(document_id.to_string()))?;

    if let Err(e) = std::fs::remove_file(&document.storage_path) {
        warn!(document_id, error = %e, "Could not remove stored file");
    }

    db.delete_document(document_id).await?;
    info!(document_id, "Document removed");
    Ok(())
}

/// Print the document list to console
pub fn print_documents(documents: &[DocumentInfo]) {
    println!("\n📄 Documents\n");

    if documents.is_empty() {
        println!("No documents. Use 'factmill ingest' to upload one.");
        return;
    }

    for doc in documents {
        println!(
            "• {} [{}]",
            doc.title.as_deref().unwrap_or(&doc.file_name),
            doc.file_type
        );
        println!("  ID: {}", doc.id);
        match (&doc.status, doc.progress) {
            (Some(status), Some(progress)) => println!("  Status: {} ({}%)", status, progress),
            _ => println!("  Status: (none)"),
        }
        println!(
            "  Chunks: {}, knowledge items: {}, size: {} bytes",
            doc.chunk_count, doc.knowledge_item_count, doc.file_size
        );
        println!("  Created: {}", doc.created_at);
        println!();
    }
}

/// Print document IDs with descriptions for shell completions
pub fn print_document_completions(documents: &[DocumentInfo], shell: Shell) {
    for doc in documents {
        let description = format!(
            "{} ({})",
            doc.file_name,
            doc.status.as_deref().unwrap_or("no status")
        )
        .replace('\n', " ");

        match shell {
            Shell::Zsh => {
                println!("{}:{}", doc.id, description.replace(':', "\\:"));
            }
            Shell::Fish => {
                println!("{}\t{}", doc.id, description.replace('\t', " "));
            }
            _ => {
                println!("{}", doc.id);
            }
        }
    }
}
