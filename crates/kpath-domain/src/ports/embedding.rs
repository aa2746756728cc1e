//! Embedding provider port

use async_trait::async_trait;
use std::path::Path;

use crate::error::{Error, Result};
use crate::value_objects::Embedding;

/// Text-to-vector contract
///
/// Two implementations are interchangeable behind this trait: a pretrained
/// sentence encoder (preferred, `fit` is a no-op) and a statistical
/// fallback that must be fitted on a corpus before use. The active
/// implementation is chosen once at startup.
///
/// Contract notes:
///
/// - batch output preserves input order
/// - empty or whitespace-only input yields the zero vector, not an error
/// - a within-batch failure degrades that item to the zero vector instead
///   of failing the batch
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text (default implementation delegates to the batch)
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::embedding("No embedding returned"))
    }

    /// Embed multiple texts, one vector per input in the same order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Fit the model on a corpus
    ///
    /// Pretrained providers ignore this; the statistical fallback requires
    /// it before the first `embed` call.
    async fn fit(&self, _corpus: &[String]) -> Result<()> {
        Ok(())
    }

    /// Persist the model configuration and any fitted parameters
    async fn save(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    /// Restore fitted parameters from disk
    async fn load(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    /// Whether the provider is ready to embed (fitted, or pretrained)
    fn is_fitted(&self) -> bool {
        true
    }

    /// Dimensionality of produced vectors
    fn dimensions(&self) -> usize;

    /// Identifier of this provider implementation
    fn provider_name(&self) -> &str;

    /// Health check (default: embed a probe string)
    async fn health_check(&self) -> Result<()> {
        self.embed("health check").await?;
        Ok(())
    }
}
