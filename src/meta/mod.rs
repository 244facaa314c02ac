//! Metadata storage using SQLite
//!
//! This module handles all local metadata storage including:
//! - Documents (uploaded files)
//! - Document chunks (normalized text units)
//! - Knowledge bases and knowledge items (embedded chunks/facts)
//! - Processing status (one row per document, overwritten in place)
//!
//! The status row is the only communication channel between a detached
//! ingestion task and its observers, so the write path enforces the
//! lifecycle here: progress never decreases, terminal rows are frozen,
//! and only legal transitions go through.

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Document processing lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Uploading,
    Processing,
    Embedding,
    Completed,
    Failed,
    FactsExtracting,
    FactsSaving,
    FactsCompleted,
    FactsFailed,
}

impl ProcessingState {
    /// Terminal states accept no further updates except an explicit restart
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingState::Completed
                | ProcessingState::Failed
                | ProcessingState::FactsCompleted
                | ProcessingState::FactsFailed
        )
    }

    /// Whether this state belongs to the standalone facts re-run lifecycle
    pub fn is_facts(&self) -> bool {
        matches!(
            self,
            ProcessingState::FactsExtracting
                | ProcessingState::FactsSaving
                | ProcessingState::FactsCompleted
                | ProcessingState::FactsFailed
        )
    }

    /// Legal forward transitions. Restarts (terminal -> uploading or
    /// facts_extracting) bypass this via `MetaDb::restart_status`.
    pub fn can_transition(&self, to: ProcessingState) -> bool {
        use ProcessingState::*;
        match (self, to) {
            (Uploading, Processing) | (Processing, Embedding) | (Embedding, Completed) => true,
            (Uploading | Processing | Embedding, Failed) => true,
            (FactsExtracting, FactsSaving) | (FactsSaving, FactsCompleted) => true,
            (FactsExtracting | FactsSaving, FactsFailed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessingState::Uploading => "uploading",
            ProcessingState::Processing => "processing",
            ProcessingState::Embedding => "embedding",
            ProcessingState::Completed => "completed",
            ProcessingState::Failed => "failed",
            ProcessingState::FactsExtracting => "facts_extracting",
            ProcessingState::FactsSaving => "facts_saving",
            ProcessingState::FactsCompleted => "facts_completed",
            ProcessingState::FactsFailed => "facts_failed",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ProcessingState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uploading" => Ok(ProcessingState::Uploading),
            "processing" => Ok(ProcessingState::Processing),
            "embedding" => Ok(ProcessingState::Embedding),
            "completed" => Ok(ProcessingState::Completed),
            "failed" => Ok(ProcessingState::Failed),
            "facts_extracting" => Ok(ProcessingState::FactsExtracting),
            "facts_saving" => Ok(ProcessingState::FactsSaving),
            "facts_completed" => Ok(ProcessingState::FactsCompleted),
            "facts_failed" => Ok(ProcessingState::FactsFailed),
            _ => Err(Error::Other(format!("Unknown processing state: {}", s))),
        }
    }
}

/// An uploaded document
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub workspace_id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub storage_path: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content_hash: String,
    pub created_at: String,
}

impl Document {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: String,
        workspace_id: String,
        file_name: String,
        file_type: String,
        file_size: i64,
        storage_path: String,
        content_hash: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            workspace_id,
            file_name,
            file_type,
            file_size,
            storage_path,
            title: None,
            description: None,
            content_hash,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A normalized text chunk
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    pub position: i32,
    pub content: String,
    pub content_length: i32,
    pub created_at: String,
}

impl DocumentChunk {
    pub fn new(document_id: String, position: i32, content: String) -> Self {
        let content_length = content.chars().count() as i32;
        Self {
            id: Uuid::new_v4().to_string(),
            document_id,
            position,
            content,
            content_length,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A named container for retrievable knowledge items
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

impl KnowledgeBase {
    pub fn new(user_id: String, name: String, description: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            name,
            description,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// An embedded, retrievable item (a chunk or an extracted fact)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: String,
    pub document_id: String,
    pub knowledge_base_id: String,
    pub user_id: String,
    pub content: String,
    pub embedding_json: String,
    pub source_chunk: i32,
    pub source_type: String,
    pub source_name: String,
    pub token_count: i32,
    pub created_at: String,
}

impl KnowledgeItem {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        document_id: String,
        knowledge_base_id: String,
        user_id: String,
        content: String,
        embedding: &[f32],
        source_chunk: i32,
        source_type: &str,
        source_name: String,
    ) -> Self {
        // Rough token estimate, good enough for reporting
        let token_count = (content.chars().count() / 4).max(1) as i32;
        Self {
            id: Uuid::new_v4().to_string(),
            document_id,
            knowledge_base_id,
            user_id,
            embedding_json: serde_json::to_string(embedding).unwrap_or_else(|_| "[]".to_string()),
            content,
            source_chunk,
            source_type: source_type.to_string(),
            source_name,
            token_count,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn embedding(&self) -> Vec<f32> {
        serde_json::from_str(&self.embedding_json).unwrap_or_default()
    }
}

/// Processing status row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub document_id: String,
    pub status: String,
    pub progress: i64,
    pub error_message: Option<String>,
    pub updated_at: String,
}

impl ProcessingStatus {
    pub fn state(&self) -> Result<ProcessingState> {
        self.status.parse()
    }
}

/// Metadata database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the metadata database
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::connect_path(&config.paths.db_file).await
    }

    /// Connect to a specific database file
    pub async fn connect_path(db_path: &Path) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='documents'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    // ===== Document Operations =====

    /// Insert a new document
    pub async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, user_id, workspace_id, file_name, file_type, file_size, storage_path, title, description, content_hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.user_id)
        .bind(&doc.workspace_id)
        .bind(&doc.file_name)
        .bind(&doc.file_type)
        .bind(doc.file_size)
        .bind(&doc.storage_path)
        .bind(&doc.title)
        .bind(&doc.description)
        .bind(&doc.content_hash)
        .bind(&doc.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get document by ID
    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let doc = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc)
    }

    /// List documents in a workspace
    pub async fn list_documents(&self, workspace_id: &str) -> Result<Vec<Document>> {
        let docs = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE workspace_id = ? ORDER BY created_at DESC",
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    /// Find a document with the same content in the same workspace
    pub async fn find_document_by_hash(
        &self,
        workspace_id: &str,
        content_hash: &str,
    ) -> Result<Option<Document>> {
        let doc = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE workspace_id = ? AND content_hash = ? LIMIT 1",
        )
        .bind(workspace_id)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doc)
    }

    /// Delete a document and everything derived from it
    pub async fn delete_document(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM knowledge_items WHERE document_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM document_chunks WHERE document_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM processing_status WHERE document_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete everything derived from a document (knowledge items and
    /// chunks) so it can be reprocessed from the stored file. The document
    /// row and its status row stay.
    pub async fn clear_derived_data(&self, document_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM knowledge_items WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM document_chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ===== Chunk Operations =====

    /// Insert a batch of chunks in one transaction
    pub async fn insert_chunks(&self, chunks: &[DocumentChunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO document_chunks (id, document_id, position, content, content_length, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.position)
            .bind(&chunk.content)
            .bind(chunk.content_length)
            .bind(&chunk.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Get chunks for a document in position order
    pub async fn get_chunks(&self, document_id: &str) -> Result<Vec<DocumentChunk>> {
        let chunks = sqlx::query_as::<_, DocumentChunk>(
            "SELECT * FROM document_chunks WHERE document_id = ? ORDER BY position",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    /// Count chunks for a document
    pub async fn chunk_count(&self, document_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks WHERE document_id = ?")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    // ===== Knowledge Base Operations =====

    /// Insert a new knowledge base
    pub async fn create_knowledge_base(&self, kb: &KnowledgeBase) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO knowledge_bases (id, user_id, name, description, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&kb.id)
        .bind(&kb.user_id)
        .bind(&kb.name)
        .bind(&kb.description)
        .bind(&kb.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get knowledge base by ID
    pub async fn get_knowledge_base(&self, id: &str) -> Result<Option<KnowledgeBase>> {
        let kb = sqlx::query_as::<_, KnowledgeBase>("SELECT * FROM knowledge_bases WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(kb)
    }

    /// Get a user's knowledge base by name
    pub async fn get_knowledge_base_by_name(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<Option<KnowledgeBase>> {
        let kb = sqlx::query_as::<_, KnowledgeBase>(
            "SELECT * FROM knowledge_bases WHERE user_id = ? AND name = ?",
        )
        .bind(user_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(kb)
    }

    /// Delete a knowledge base and its items
    pub async fn delete_knowledge_base(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM knowledge_items WHERE knowledge_base_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM knowledge_bases WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ===== Knowledge Item Operations =====

    /// Insert a batch of knowledge items in one transaction
    pub async fn insert_knowledge_items(&self, items: &[KnowledgeItem]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO knowledge_items (id, document_id, knowledge_base_id, user_id, content, embedding_json, source_chunk, source_type, source_name, token_count, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&item.id)
            .bind(&item.document_id)
            .bind(&item.knowledge_base_id)
            .bind(&item.user_id)
            .bind(&item.content)
            .bind(&item.embedding_json)
            .bind(item.source_chunk)
            .bind(&item.source_type)
            .bind(&item.source_name)
            .bind(item.token_count)
            .bind(&item.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Count knowledge items for a document
    pub async fn knowledge_item_count(&self, document_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_items WHERE document_id = ?")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Delete knowledge items of a given source type for a document
    pub async fn delete_knowledge_items_by_type(
        &self,
        document_id: &str,
        source_type: &str,
    ) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM knowledge_items WHERE document_id = ? AND source_type = ?")
                .bind(document_id)
                .bind(source_type)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    // ===== Status Operations =====

    /// Get the status row for a document
    pub async fn get_status(&self, document_id: &str) -> Result<Option<ProcessingStatus>> {
        let status = sqlx::query_as::<_, ProcessingStatus>(
            "SELECT * FROM processing_status WHERE document_id = ?",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(status)
    }

    /// Write a status update, enforcing the lifecycle:
    /// - progress never decreases within a run
    /// - terminal rows are frozen (update logged and dropped)
    /// - only legal transitions are accepted
    pub async fn upsert_status(
        &self,
        document_id: &str,
        state: ProcessingState,
        progress: f64,
        error_message: Option<&str>,
    ) -> Result<()> {
        let rounded = progress.round().clamp(0.0, 100.0) as i64;

        let current = self.get_status(document_id).await?;
        let Some(current) = current else {
            return self.write_status(document_id, state, rounded, error_message).await;
        };

        let from = current.state()?;
        if from == state {
            let clamped = rounded.max(current.progress);
            return self.write_status(document_id, state, clamped, error_message).await;
        }
        if from.is_terminal() {
            warn!(
                document_id,
                from = %from,
                to = %state,
                "Dropping status update for terminal document"
            );
            return Ok(());
        }
        if !from.can_transition(state) {
            return Err(Error::InvalidStatusTransition {
                from: from.to_string(),
                to: state.to_string(),
            });
        }

        let clamped = rounded.max(current.progress);
        self.write_status(document_id, state, clamped, error_message).await
    }

    /// Mark a document failed in whichever lifecycle it is in, keeping the
    /// last reported progress.
    pub async fn mark_failed(&self, document_id: &str, message: &str) -> Result<()> {
        let current = self.get_status(document_id).await?;
        let (failed_state, progress) = match &current {
            Some(row) => {
                let from = row.state()?;
                if from.is_terminal() {
                    warn!(document_id, "Dropping failure for terminal document");
                    return Ok(());
                }
                let failed = if from.is_facts() {
                    ProcessingState::FactsFailed
                } else {
                    ProcessingState::Failed
                };
                (failed, row.progress)
            }
            None => (ProcessingState::Failed, 0),
        };

        self.write_status(document_id, failed_state, progress, Some(message))
            .await
    }

    /// Restart the status row for a re-run, bypassing transition checks.
    /// Used when fact extraction is re-run on a completed document.
    pub async fn restart_status(
        &self,
        document_id: &str,
        state: ProcessingState,
        progress: f64,
    ) -> Result<()> {
        let rounded = progress.round().clamp(0.0, 100.0) as i64;
        self.write_status(document_id, state, rounded, None).await
    }

    async fn write_status(
        &self,
        document_id: &str,
        state: ProcessingState,
        progress: i64,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO processing_status (document_id, status, progress, error_message, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(document_id) DO UPDATE SET
                status = excluded.status,
                progress = excluded.progress,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(document_id)
        .bind(state.to_string())
        .bind(progress)
        .bind(error_message)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
