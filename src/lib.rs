//! factmill - document ingestion and knowledge-extraction pipeline
//!
//! Turns uploaded files into retrievable knowledge: extracted text units
//! are normalized into self-contained chunks, atomic facts are derived
//! from each chunk, and both are embedded and persisted for a RAG
//! backend. Processing runs detached from the upload call; a per-document
//! status row is the single source of truth about progress.

pub mod commands;
pub mod config;
pub mod embed;
pub mod error;
pub mod extract;
pub mod facts;
pub mod llm;
pub mod meta;
pub mod normalize;
pub mod pipeline;
pub mod progress;

pub use error::{Error, Result};
