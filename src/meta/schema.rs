//! SQLite schema definition

/// SQL schema for the metadata database
pub const SCHEMA_SQL: &str = r#"
-- Documents: uploaded files
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    workspace_id TEXT NOT NULL,
    file_name TEXT NOT NULL,
    file_type TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    storage_path TEXT NOT NULL,
    title TEXT,
    description TEXT,
    content_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Chunks: normalized text units, densely numbered per document
CREATE TABLE IF NOT EXISTS document_chunks (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id),
    position INTEGER NOT NULL,
    content TEXT NOT NULL,
    content_length INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(document_id, position)
);

-- Knowledge bases: named containers for retrievable items
CREATE TABLE IF NOT EXISTS knowledge_bases (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL
);

-- Knowledge items: embedded chunks and facts
CREATE TABLE IF NOT EXISTS knowledge_items (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id),
    knowledge_base_id TEXT NOT NULL REFERENCES knowledge_bases(id),
    user_id TEXT NOT NULL,
    content TEXT NOT NULL,
    embedding_json TEXT NOT NULL,
    source_chunk INTEGER NOT NULL,
    source_type TEXT NOT NULL,
    source_name TEXT NOT NULL,
    token_count INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

-- Processing status: one row per document, overwritten in place
CREATE TABLE IF NOT EXISTS processing_status (
    document_id TEXT PRIMARY KEY REFERENCES documents(id),
    status TEXT NOT NULL,
    progress INTEGER NOT NULL,
    error_message TEXT,
    updated_at TEXT NOT NULL
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_documents_hash ON documents(content_hash);
CREATE INDEX IF NOT EXISTS idx_documents_workspace ON documents(workspace_id);
CREATE INDEX IF NOT EXISTS idx_chunks_document ON document_chunks(document_id);
CREATE INDEX IF NOT EXISTS idx_items_document ON knowledge_items(document_id);
CREATE INDEX IF NOT EXISTS idx_items_kb ON knowledge_items(knowledge_base_id);
"#;
