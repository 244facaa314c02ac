//! Embedding generation
//!
//! This module provides an abstraction over embedding providers with:
//! - A trait for different embedding backends
//! - A remote HTTP backend (primary provider, called in bulk batches)
//! - A local fastembed backend (fallback provider, called per item)

mod http_backend;
#[cfg(feature = "local-embed")]
mod local;

pub use http_backend::HttpEmbedder;
#[cfg(feature = "local-embed")]
pub use local::LocalEmbedder;

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::warn;

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// How a provider is driven by `embed_batch`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    /// One provider call for the whole slice; a short response fails the
    /// call with `EmbeddingCountMismatch`. Used for the primary provider.
    Bulk,
    /// One provider call per item; a failed item yields `None` at its
    /// position. Used for the local fallback.
    PerItem,
}

impl EmbedMode {
    /// The mode a provider is intended to run in
    pub fn for_provider(provider: EmbeddingProvider) -> Self {
        match provider {
            EmbeddingProvider::Primary => EmbedMode::Bulk,
            EmbeddingProvider::Local => EmbedMode::PerItem,
        }
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.resolved_provider()? {
        EmbeddingProvider::Primary => Ok(Box::new(HttpEmbedder::new(config)?)),
        EmbeddingProvider::Local => {
            #[cfg(feature = "local-embed")]
            {
                Ok(Box::new(LocalEmbedder::new(config)?))
            }
            #[cfg(not(feature = "local-embed"))]
            {
                Err(Error::Embedding(
                    "Local embedding backend unavailable. Enable the 'local-embed' feature."
                        .to_string(),
                ))
            }
        }
    }
}

/// Embed a slice of texts, returning one `Option<vector>` per input in
/// input order. The output length always equals the input length.
pub async fn embed_batch(
    embedder: &dyn Embedder,
    texts: &[String],
    mode: EmbedMode,
) -> Result<Vec<Option<Vec<f32>>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    match mode {
        EmbedMode::Bulk => {
            let vectors = embedder.embed(texts.to_vec()).await?;
            if vectors.len() != texts.len() {
                return Err(Error::EmbeddingCountMismatch {
                    expected: texts.len(),
                    actual: vectors.len(),
                });
            }
            Ok(vectors.into_iter().map(Some).collect())
        }
        EmbedMode::PerItem => {
            let mut out = Vec::with_capacity(texts.len());
            for (i, text) in texts.iter().enumerate() {
                match embedder.embed(vec![text.clone()]).await {
                    Ok(mut vectors) if vectors.len() == 1 => out.push(Some(vectors.remove(0))),
                    Ok(vectors) => {
                        warn!(
                            item = i,
                            got = vectors.len(),
                            "Local embedder returned wrong vector count for single item"
                        );
                        out.push(None);
                    }
                    Err(e) => {
                        warn!(item = i, error = %e, "Item embedding failed, skipping");
                        out.push(None);
                    }
                }
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stub embedder that fails for texts containing "poison" and can
    /// optionally return a short batch.
    struct StubEmbedder {
        drop_last: bool,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains("poison")) {
                return Err(Error::Embedding("poisoned input".to_string()));
            }
            let mut n = texts.len();
            if self.drop_last && n > 1 {
                n -= 1;
            }
            Ok((0..n).map(|_| vec![0.0, 1.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_bulk_mode_full_batch() {
        let embedder = StubEmbedder { drop_last: false };
        let input = texts(&["a", "b", "c"]);

        let out = embed_batch(&embedder, &input, EmbedMode::Bulk).await.unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|v| v.is_some()));
    }

    #[tokio::test]
    async fn test_bulk_mode_count_mismatch() {
        let embedder = StubEmbedder { drop_last: true };
        let input = texts(&["a", "b", "c"]);

        let err = embed_batch(&embedder, &input, EmbedMode::Bulk)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::EmbeddingCountMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_bulk_mode_propagates_provider_error() {
        let embedder = StubEmbedder { drop_last: false };
        let input = texts(&["a", "poison", "c"]);

        assert!(embed_batch(&embedder, &input, EmbedMode::Bulk).await.is_err());
    }

    #[tokio::test]
    async fn test_per_item_mode_isolates_failures() {
        let embedder = StubEmbedder { drop_last: false };
        let input = texts(&["a", "poison", "c"]);

        let out = embed_batch(&embedder, &input, EmbedMode::PerItem)
            .await
            .unwrap();
        assert_eq!(out.len(), 3);
        assert!(out[0].is_some());
        assert!(out[1].is_none());
        assert!(out[2].is_some());
    }

    #[tokio::test]
    async fn test_empty_input() {
        let embedder = StubEmbedder { drop_last: false };
        let out = embed_batch(&embedder, &[], EmbedMode::Bulk).await.unwrap();
        assert!(out.is_empty());
    }
}
