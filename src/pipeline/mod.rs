//! Ingestion pipeline orchestration
//!
//! Drives a document through upload, extraction, normalization, fact
//! extraction, embedding, and persistence. The heavy stages run in a
//! detached task; the status row is the only channel back to callers, so
//! every stage boundary writes progress through `MetaDb::upsert_status`.
//!
//! Progress bands: upload 0-10, extraction 10-30, normalization 30-50,
//! chunks persisted at 50, fact extraction 50-60, embedding 60-100.

mod report;

pub use report::{status_report, StatusReport};

use crate::config::Config;
use crate::embed::{create_embedder, embed_batch, EmbedMode};
use crate::error::{Error, Result};
use crate::extract;
use crate::facts::{Fact, FactExtractor};
use crate::llm::LlmClient;
use crate::meta::{Document, DocumentChunk, KnowledgeBase, KnowledgeItem, MetaDb, ProcessingState};
use crate::normalize::ChunkNormalizer;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Options for a document upload
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub user_id: String,
    pub workspace_id: String,
    /// Target knowledge base; a default one is created when unset
    pub knowledge_base_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Result of accepting an upload
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub document: Document,
    pub knowledge_base_id: String,
    /// True when identical content already existed in the workspace and
    /// no new processing was started
    pub deduplicated: bool,
}

/// Pipeline orchestrator
#[derive(Clone)]
pub struct Pipeline {
    db: MetaDb,
    config: Config,
}

impl Pipeline {
    pub fn new(db: MetaDb, config: Config) -> Self {
        Self { db, config }
    }

    pub fn db(&self) -> &MetaDb {
        &self.db
    }

    /// Accept an upload: hash, dedup, copy into storage, register the
    /// document, and write the initial status row. Does not start
    /// processing.
    pub async fn begin_document(&self, path: &Path, options: &IngestOptions) -> Result<UploadReceipt> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Other(format!("Invalid file path: {}", path.display())))?
            .to_string();

        // Reject unknown formats before anything is stored
        let format = extract::FileFormat::from_path(path).ok_or_else(|| {
            Error::UnsupportedFormat(
                path.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("(no extension)")
                    .to_string(),
            )
        })?;

        let bytes = std::fs::read(path)?;
        let content_hash = blake3::hash(&bytes).to_hex().to_string();

        let knowledge_base_id = self.resolve_knowledge_base(options).await?;

        // Identical content in the same workspace: idempotent re-upload,
        // unless the earlier run failed or went stale. Re-uploading is the
        // caller's recovery path, so those restart processing instead.
        if let Some(existing) = self
            .db
            .find_document_by_hash(&options.workspace_id, &content_hash)
            .await?
        {
            if self.needs_reprocessing(&existing.id).await? {
                info!(
                    document_id = %existing.id,
                    %file_name,
                    "Re-upload of failed document, restarting processing"
                );
                self.db.clear_derived_data(&existing.id).await?;
                self.db
                    .restart_status(&existing.id, ProcessingState::Uploading, 0.0)
                    .await?;
                return Ok(UploadReceipt {
                    document: existing,
                    knowledge_base_id,
                    deduplicated: false,
                });
            }

            info!(
                document_id = %existing.id,
                %file_name,
                "Duplicate content, reusing existing document"
            );
            return Ok(UploadReceipt {
                document: existing,
                knowledge_base_id,
                deduplicated: true,
            });
        }

        let document_id = Uuid::new_v4().to_string();
        let storage_path = self
            .config
            .paths
            .storage_dir
            .join(format!("{}_{}", document_id, file_name));
        std::fs::create_dir_all(&self.config.paths.storage_dir)?;
        std::fs::copy(path, &storage_path)?;

        let mut document = Document::new(
            options.user_id.clone(),
            options.workspace_id.clone(),
            file_name,
            format.label().to_string(),
            bytes.len() as i64,
            storage_path.to_string_lossy().to_string(),
            content_hash,
        );
        document.id = document_id;
        document.title = options.title.clone();
        document.description = options.description.clone();

        self.db.insert_document(&document).await?;
        self.db
            .upsert_status(&document.id, ProcessingState::Uploading, 0.0, None)
            .await?;

        info!(document_id = %document.id, "Document accepted for ingestion");

        Ok(UploadReceipt {
            document,
            knowledge_base_id,
            deduplicated: false,
        })
    }

    /// Whether a hash-matched document should be reprocessed instead of
    /// deduplicated: its last run ended `failed`, its status row went
    /// stale mid-run, or it never got a status row at all. A `facts_failed`
    /// row still dedups; its recovery path is a facts re-run.
    async fn needs_reprocessing(&self, document_id: &str) -> Result<bool> {
        let Some(row) = self.db.get_status(document_id).await? else {
            return Ok(true);
        };
        let state = row.state()?;
        if state == ProcessingState::Failed {
            return Ok(true);
        }
        let staleness = self.config.pipeline.staleness_secs as i64;
        Ok(!state.is_terminal() && report::age_secs(&row.updated_at) > staleness)
    }

    /// Run the full pipeline in a detached task. The caller gets nothing
    /// back; outcomes land on the status row.
    pub fn spawn_ingest(&self, document: Document, knowledge_base_id: String) {
        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.process_document(document, knowledge_base_id).await;
        });
    }

    /// Run the full pipeline, recording any failure on the status row
    pub async fn process_document(&self, document: Document, knowledge_base_id: String) {
        let document_id = document.id.clone();
        if let Err(e) = self.run(&document, &knowledge_base_id).await {
            error!(%document_id, error = %e, "Ingestion failed");
            if let Err(write_err) = self.db.mark_failed(&document_id, &e.to_string()).await {
                error!(%document_id, error = %write_err, "Failed to record failure");
            }
        }
    }

    async fn run(&self, document: &Document, knowledge_base_id: &str) -> Result<()> {
        let document_id = &document.id;
        let source_path = PathBuf::from(&document.storage_path);

        // Extraction: 10 -> 30, forwarded from the blocking task
        self.db
            .upsert_status(document_id, ProcessingState::Processing, 10.0, None)
            .await?;

        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, usize)>();
        let extract_path = source_path.clone();
        let join = tokio::task::spawn_blocking(move || {
            extract::extract(&extract_path, |done, total| {
                let _ = tx.send((done, total));
            })
        });

        while let Some((done, total)) = rx.recv().await {
            let progress = 10.0 + 20.0 * done as f64 / total.max(1) as f64;
            self.db
                .upsert_status(document_id, ProcessingState::Processing, progress, None)
                .await?;
        }

        let units = join
            .await
            .map_err(|e| Error::Other(format!("Extraction task panicked: {}", e)))??;
        debug!(%document_id, units = units.len(), "Extraction complete");

        // Normalization: 30 -> 50
        let llm = LlmClient::new(&self.config.llm)?;
        let normalizer = ChunkNormalizer::new(&llm);
        let display_title = document.title.as_deref().unwrap_or(&document.file_name);

        let total_units = units.len();
        let mut chunks = Vec::with_capacity(total_units);
        for unit in &units {
            let normalized = normalizer.normalize(&unit.text, display_title, unit.index).await;
            chunks.push(DocumentChunk::new(
                document_id.clone(),
                unit.index as i32,
                normalized,
            ));
            let progress = 30.0 + 20.0 * (unit.index + 1) as f64 / total_units as f64;
            self.db
                .upsert_status(document_id, ProcessingState::Processing, progress, None)
                .await?;
        }

        self.db.insert_chunks(&chunks).await?;
        self.db
            .upsert_status(document_id, ProcessingState::Processing, 50.0, None)
            .await?;

        // Fact extraction: 50 -> 60, failures cost facts but not the run
        let extractor = FactExtractor::new(&llm);
        let mut facts = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            facts.extend(extractor.extract_facts(&chunk.content, chunk.position).await);
            let progress = 50.0 + 10.0 * (i + 1) as f64 / chunks.len() as f64;
            self.db
                .upsert_status(document_id, ProcessingState::Processing, progress, None)
                .await?;
        }
        info!(%document_id, facts = facts.len(), "Fact extraction complete");

        // Embedding and persistence: 60 -> 100
        self.db
            .upsert_status(document_id, ProcessingState::Embedding, 60.0, None)
            .await?;

        let items = self
            .embed_and_collect(document, knowledge_base_id, &chunks, &facts)
            .await?;
        self.db.insert_knowledge_items(&items).await?;

        self.db
            .upsert_status(document_id, ProcessingState::Completed, 100.0, None)
            .await?;
        info!(%document_id, items = items.len(), "Ingestion complete");
        Ok(())
    }

    /// Embed chunk and fact texts in batches and build knowledge items.
    /// Items whose embedding failed in per-item mode are skipped.
    async fn embed_and_collect(
        &self,
        document: &Document,
        knowledge_base_id: &str,
        chunks: &[DocumentChunk],
        facts: &[Fact],
    ) -> Result<Vec<KnowledgeItem>> {
        // (content, source_type, source_chunk)
        let entries: Vec<(&str, &'static str, i32)> = chunks
            .iter()
            .map(|c| (c.content.as_str(), "chunk", c.position))
            .chain(facts.iter().map(|f| (f.content.as_str(), "fact", f.source_chunk)))
            .collect();

        let texts: Vec<String> = entries.iter().map(|(t, _, _)| t.to_string()).collect();

        let embedder = create_embedder(&self.config.embedding)?;
        let mode = EmbedMode::for_provider(self.config.embedding.resolved_provider()?);
        let batch_size = self.config.embedding.batch_size;
        debug!(
            model = embedder.model_name(),
            items = texts.len(),
            "Embedding knowledge items"
        );

        let total_batches = texts.len().div_ceil(batch_size).max(1);
        let mut vectors = Vec::with_capacity(texts.len());
        for (batch_index, batch) in texts.chunks(batch_size).enumerate() {
            vectors.extend(embed_batch(embedder.as_ref(), batch, mode).await?);
            let progress = 70.0 + 29.0 * (batch_index + 1) as f64 / total_batches as f64;
            self.db
                .upsert_status(&document.id, ProcessingState::Embedding, progress, None)
                .await?;
        }

        let mut items = Vec::with_capacity(entries.len());
        for ((content, source_type, source_chunk), vector) in entries.into_iter().zip(vectors) {
            match vector {
                Some(embedding) => items.push(KnowledgeItem::new(
                    document.id.clone(),
                    knowledge_base_id.to_string(),
                    document.user_id.clone(),
                    content.to_string(),
                    &embedding,
                    source_chunk,
                    source_type,
                    document.file_name.clone(),
                )),
                None => {
                    warn!(
                        document_id = %document.id,
                        source_type,
                        source_chunk,
                        "Skipping item without embedding"
                    );
                }
            }
        }
        Ok(items)
    }

    /// Re-run fact extraction on an already ingested document, recording
    /// any failure on the status row
    pub async fn process_facts(&self, document_id: &str, knowledge_base_id: &str) {
        if let Err(e) = self.run_facts(document_id, knowledge_base_id).await {
            error!(document_id, error = %e, "Fact re-extraction failed");
            if let Err(write_err) = self.db.mark_failed(document_id, &e.to_string()).await {
                error!(document_id, error = %write_err, "Failed to record failure");
            }
        }
    }

    /// Re-run fact extraction against persisted chunks. Replaces existing
    /// fact items; chunk items are untouched.
    pub async fn run_facts(&self, document_id: &str, knowledge_base_id: &str) -> Result<()> {
        let document = self
            .db
            .get_document(document_id)
            .await?
            .ok_or_else(|| Error::DocumentNotFound(document_id.to_string()))?;

        let chunks = self.db.get_chunks(document_id).await?;
        if chunks.is_empty() {
            return Err(Error::Other(format!(
                "Document {} has no chunks; ingest it first",
                document_id
            )));
        }

        self.db
            .restart_status(document_id, ProcessingState::FactsExtracting, 0.0)
            .await?;

        let llm = LlmClient::new(&self.config.llm)?;
        let extractor = FactExtractor::new(&llm);
        let mut facts = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            facts.extend(extractor.extract_facts(&chunk.content, chunk.position).await);
            let progress = 90.0 * (i + 1) as f64 / chunks.len() as f64;
            self.db
                .upsert_status(document_id, ProcessingState::FactsExtracting, progress, None)
                .await?;
        }
        info!(document_id, facts = facts.len(), "Fact re-extraction complete");

        self.db
            .upsert_status(document_id, ProcessingState::FactsSaving, 95.0, None)
            .await?;

        let items = self
            .embed_facts(&document, knowledge_base_id, &facts)
            .await?;
        let replaced = self
            .db
            .delete_knowledge_items_by_type(document_id, "fact")
            .await?;
        debug!(document_id, replaced, "Replaced previous fact items");
        self.db.insert_knowledge_items(&items).await?;

        self.db
            .upsert_status(document_id, ProcessingState::FactsCompleted, 100.0, None)
            .await?;
        Ok(())
    }

    async fn embed_facts(
        &self,
        document: &Document,
        knowledge_base_id: &str,
        facts: &[Fact],
    ) -> Result<Vec<KnowledgeItem>> {
        if facts.is_empty() {
            return Ok(Vec::new());
        }

        let embedder = create_embedder(&self.config.embedding)?;
        let mode = EmbedMode::for_provider(self.config.embedding.resolved_provider()?);
        let batch_size = self.config.embedding.batch_size;

        let texts: Vec<String> = facts.iter().map(|f| f.content.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            vectors.extend(embed_batch(embedder.as_ref(), batch, mode).await?);
        }

        let mut items = Vec::with_capacity(facts.len());
        for (fact, vector) in facts.iter().zip(vectors) {
            match vector {
                Some(embedding) => items.push(KnowledgeItem::new(
                    document.id.clone(),
                    knowledge_base_id.to_string(),
                    document.user_id.clone(),
                    fact.content.clone(),
                    &embedding,
                    fact.source_chunk,
                    "fact",
                    document.file_name.clone(),
                )),
                None => {
                    warn!(
                        document_id = %document.id,
                        source_chunk = fact.source_chunk,
                        "Skipping fact without embedding"
                    );
                }
            }
        }
        Ok(items)
    }

    /// Resolve the target knowledge base: an explicit ID must exist, and
    /// with no ID the user's default base is found or created.
    async fn resolve_knowledge_base(&self, options: &IngestOptions) -> Result<String> {
        if let Some(id) = &options.knowledge_base_id {
            return match self.db.get_knowledge_base(id).await? {
                Some(kb) => Ok(kb.id),
                None => Err(Error::KnowledgeBaseNotFound(id.clone())),
            };
        }

        if let Some(kb) = self
            .db
            .get_knowledge_base_by_name(&options.user_id, "default")
            .await?
        {
            return Ok(kb.id);
        }

        let kb = KnowledgeBase::new(
            options.user_id.clone(),
            "default".to_string(),
            Some("Default knowledge base".to_string()),
        );
        self.db.create_knowledge_base(&kb).await?;
        info!(knowledge_base_id = %kb.id, "Created default knowledge base");
        Ok(kb.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathsConfig;
    use std::io::Write;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FILE_TEXT: &str =
        "The factory opened in 1962. It employed four hundred workers.";
    // Same content reshaped onto two lines: passes the lossiness guard as a
    // normalization and parses as two facts.
    const LLM_TEXT: &str =
        "The factory opened in 1962.\nIt employed four hundred workers.";

    async fn test_setup(llm: &MockServer, embed: &MockServer) -> (Pipeline, TempDir) {
        let dir = TempDir::new().unwrap();

        let mut config = Config::default();
        config.llm.endpoint = llm.uri();
        config.embedding.backend_url = embed.uri();
        config.embedding.dimension = 2;
        config.paths = PathsConfig {
            base_dir: dir.path().to_path_buf(),
            config_file: dir.path().join("config.toml"),
            db_file: dir.path().join("meta.db"),
            storage_dir: dir.path().join("uploads"),
        };

        let db = MetaDb::connect_path(&config.paths.db_file).await.unwrap();
        db.init_schema().await.unwrap();
        (Pipeline::new(db, config), dir)
    }

    fn write_upload(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    fn write_docx_upload(dir: &TempDir, name: &str, paragraphs: &[&str]) -> PathBuf {
        let path = dir.path().join(name);
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        write!(
            writer,
            "<?xml version=\"1.0\"?><w:document><w:body>{}</w:body></w:document>",
            body
        )
        .unwrap();
        writer.finish().unwrap();
        path
    }

    async fn mock_llm(server: &MockServer, response: &str) {
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": response,
                "done": true
            })))
            .mount(server)
            .await;
    }

    async fn mock_embeddings(server: &MockServer, vectors: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/v1/embed/text"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "embeddings": vectors })),
            )
            .mount(server)
            .await;
    }

    fn options() -> IngestOptions {
        IngestOptions {
            user_id: "user-1".to_string(),
            workspace_id: "ws-1".to_string(),
            ..IngestOptions::default()
        }
    }

    #[tokio::test]
    async fn test_full_ingestion_happy_path() {
        let llm = MockServer::start().await;
        let embed = MockServer::start().await;
        mock_llm(&llm, LLM_TEXT).await;
        // One chunk plus two facts
        mock_embeddings(&embed, serde_json::json!([[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]])).await;

        let (pipeline, dir) = test_setup(&llm, &embed).await;
        let upload = write_upload(&dir, "notes.txt", FILE_TEXT);

        let receipt = pipeline.begin_document(&upload, &options()).await.unwrap();
        assert!(!receipt.deduplicated);

        pipeline
            .process_document(receipt.document.clone(), receipt.knowledge_base_id.clone())
            .await;

        let report = status_report(pipeline.db(), &receipt.document.id, 120)
            .await
            .unwrap();
        assert_eq!(report.state, ProcessingState::Completed);
        assert_eq!(report.progress, 100);
        assert_eq!(report.chunk_count, 1);
        assert_eq!(report.knowledge_item_count, 3);
        assert!(report.error_message.is_none());
    }

    #[tokio::test]
    async fn test_embedding_count_mismatch_fails_document() {
        let llm = MockServer::start().await;
        let embed = MockServer::start().await;
        mock_llm(&llm, LLM_TEXT).await;
        // Three inputs expected, backend returns one vector
        mock_embeddings(&embed, serde_json::json!([[0.1, 0.2]])).await;

        let (pipeline, dir) = test_setup(&llm, &embed).await;
        let upload = write_upload(&dir, "notes.txt", FILE_TEXT);

        let receipt = pipeline.begin_document(&upload, &options()).await.unwrap();
        pipeline
            .process_document(receipt.document.clone(), receipt.knowledge_base_id.clone())
            .await;

        let report = status_report(pipeline.db(), &receipt.document.id, 120)
            .await
            .unwrap();
        assert_eq!(report.state, ProcessingState::Failed);
        assert!(report
            .error_message
            .as_deref()
            .unwrap()
            .contains("mismatch"));
        // Nothing persisted from the failed embedding stage
        assert_eq!(report.knowledge_item_count, 0);
    }

    #[tokio::test]
    async fn test_multi_chunk_document_survives_one_bad_chunk() {
        const GOOD: &str = "Alpha station recorded twelve storms last winter.";
        const BAD: &str = "Bravo outpost logged zero anomalies.";

        let llm = MockServer::start().await;
        let embed = MockServer::start().await;

        // Any LLM request touching the middle paragraph fails; so its
        // normalization falls back to the original and it yields no facts.
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_string_contains("Bravo"))
            .respond_with(ResponseTemplate::new(500))
            .with_priority(1)
            .mount(&llm)
            .await;
        mock_llm(&llm, GOOD).await;

        // Three chunks plus one fact from each of the two surviving chunks
        mock_embeddings(
            &embed,
            serde_json::json!([[0.1, 0.2], [0.3, 0.4], [0.5, 0.6], [0.7, 0.8], [0.9, 1.0]]),
        )
        .await;

        let (pipeline, dir) = test_setup(&llm, &embed).await;
        let upload = write_docx_upload(&dir, "report.docx", &[GOOD, BAD, GOOD]);

        let receipt = pipeline.begin_document(&upload, &options()).await.unwrap();
        pipeline
            .process_document(receipt.document.clone(), receipt.knowledge_base_id.clone())
            .await;

        let report = status_report(pipeline.db(), &receipt.document.id, 120)
            .await
            .unwrap();
        assert_eq!(report.state, ProcessingState::Completed);
        assert_eq!(report.progress, 100);
        assert_eq!(report.chunk_count, 3);
        assert_eq!(report.knowledge_item_count, 5);

        let chunks = pipeline.db().get_chunks(&receipt.document.id).await.unwrap();
        let positions: Vec<i32> = chunks.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(chunks[0].content, GOOD);
        // Failed normalization keeps the original paragraph
        assert_eq!(chunks[1].content, BAD);
    }

    #[tokio::test]
    async fn test_reupload_of_failed_document_restarts_processing() {
        let llm = MockServer::start().await;
        let embed = MockServer::start().await;
        mock_llm(&llm, LLM_TEXT).await;
        // Short embedding batch fails the first run
        mock_embeddings(&embed, serde_json::json!([[0.1, 0.2]])).await;

        let (pipeline, dir) = test_setup(&llm, &embed).await;
        let upload = write_upload(&dir, "notes.txt", FILE_TEXT);

        let first = pipeline.begin_document(&upload, &options()).await.unwrap();
        pipeline
            .process_document(first.document.clone(), first.knowledge_base_id.clone())
            .await;
        let report = status_report(pipeline.db(), &first.document.id, 120)
            .await
            .unwrap();
        assert_eq!(report.state, ProcessingState::Failed);

        // Re-uploading the same file is the caller's recovery path: the
        // existing document is reprocessed rather than swallowed by dedup.
        let embed2 = MockServer::start().await;
        mock_embeddings(&embed2, serde_json::json!([[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]])).await;
        let mut retry = pipeline.clone();
        retry.config.embedding.backend_url = embed2.uri();

        let second = retry.begin_document(&upload, &options()).await.unwrap();
        assert!(!second.deduplicated);
        assert_eq!(second.document.id, first.document.id);

        retry
            .process_document(second.document.clone(), second.knowledge_base_id.clone())
            .await;

        let report = status_report(retry.db(), &second.document.id, 120)
            .await
            .unwrap();
        assert_eq!(report.state, ProcessingState::Completed);
        assert_eq!(report.progress, 100);
        assert_eq!(report.chunk_count, 1);
        assert_eq!(report.knowledge_item_count, 3);
    }

    #[tokio::test]
    async fn test_llm_outage_still_completes_without_facts() {
        let llm = MockServer::start().await;
        let embed = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&llm)
            .await;
        // Only the raw chunk gets embedded
        mock_embeddings(&embed, serde_json::json!([[0.1, 0.2]])).await;

        let (pipeline, dir) = test_setup(&llm, &embed).await;
        let upload = write_upload(&dir, "notes.txt", FILE_TEXT);

        let receipt = pipeline.begin_document(&upload, &options()).await.unwrap();
        pipeline
            .process_document(receipt.document.clone(), receipt.knowledge_base_id.clone())
            .await;

        let report = status_report(pipeline.db(), &receipt.document.id, 120)
            .await
            .unwrap();
        assert_eq!(report.state, ProcessingState::Completed);
        assert_eq!(report.chunk_count, 1);
        assert_eq!(report.knowledge_item_count, 1);

        // The un-normalized original survives as the chunk content
        let chunks = pipeline.db().get_chunks(&receipt.document.id).await.unwrap();
        assert_eq!(chunks[0].content, FILE_TEXT);
    }

    #[tokio::test]
    async fn test_duplicate_upload_is_idempotent() {
        let llm = MockServer::start().await;
        let embed = MockServer::start().await;
        let (pipeline, dir) = test_setup(&llm, &embed).await;
        let upload = write_upload(&dir, "notes.txt", FILE_TEXT);

        let first = pipeline.begin_document(&upload, &options()).await.unwrap();
        let second = pipeline.begin_document(&upload, &options()).await.unwrap();

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.document.id, second.document.id);

        // Same content under a different name still dedups
        let renamed = write_upload(&dir, "copy.txt", FILE_TEXT);
        let third = pipeline.begin_document(&renamed, &options()).await.unwrap();
        assert!(third.deduplicated);
    }

    #[tokio::test]
    async fn test_unknown_knowledge_base_rejected() {
        let llm = MockServer::start().await;
        let embed = MockServer::start().await;
        let (pipeline, dir) = test_setup(&llm, &embed).await;
        let upload = write_upload(&dir, "notes.txt", FILE_TEXT);

        let opts = IngestOptions {
            knowledge_base_id: Some("no-such-kb".to_string()),
            ..options()
        };
        let err = pipeline.begin_document(&upload, &opts).await.unwrap_err();
        assert!(matches!(err, Error::KnowledgeBaseNotFound(_)));
    }

    #[tokio::test]
    async fn test_facts_rerun_replaces_fact_items() {
        let llm = MockServer::start().await;
        let embed = MockServer::start().await;
        mock_llm(&llm, LLM_TEXT).await;
        mock_embeddings(&embed, serde_json::json!([[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]])).await;

        let (pipeline, dir) = test_setup(&llm, &embed).await;
        let upload = write_upload(&dir, "notes.txt", FILE_TEXT);

        let receipt = pipeline.begin_document(&upload, &options()).await.unwrap();
        pipeline
            .process_document(receipt.document.clone(), receipt.knowledge_base_id.clone())
            .await;
        assert_eq!(
            pipeline
                .db()
                .knowledge_item_count(&receipt.document.id)
                .await
                .unwrap(),
            3
        );

        // Re-run replaces the two fact items but keeps the chunk item.
        // The facts batch has two inputs; the mock returns three vectors, so
        // run the embed server with a dedicated two-vector mock.
        let embed2 = MockServer::start().await;
        mock_embeddings(&embed2, serde_json::json!([[0.7, 0.8], [0.9, 1.0]])).await;
        let mut rerun_pipeline = pipeline.clone();
        rerun_pipeline.config.embedding.backend_url = embed2.uri();

        rerun_pipeline
            .run_facts(&receipt.document.id, &receipt.knowledge_base_id)
            .await
            .unwrap();

        let report = status_report(pipeline.db(), &receipt.document.id, 120)
            .await
            .unwrap();
        assert_eq!(report.state, ProcessingState::FactsCompleted);
        assert_eq!(report.progress, 100);
        assert_eq!(report.knowledge_item_count, 3);
    }

    #[tokio::test]
    async fn test_facts_rerun_requires_chunks() {
        let llm = MockServer::start().await;
        let embed = MockServer::start().await;
        let (pipeline, dir) = test_setup(&llm, &embed).await;
        let upload = write_upload(&dir, "notes.txt", FILE_TEXT);

        let receipt = pipeline.begin_document(&upload, &options()).await.unwrap();
        // Never processed, so no chunks exist yet
        let err = pipeline
            .run_facts(&receipt.document.id, &receipt.knowledge_base_id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Other(_)));
    }
}
