//! Embedding provider implementations

#[cfg(feature = "fastembed")]
mod fastembed;
mod null;
mod tfidf;

#[cfg(feature = "fastembed")]
pub use fastembed::FastEmbedProvider;
pub use null::NullEmbeddingProvider;
pub use tfidf::TfidfEmbedder;

use std::sync::Arc;
use tracing::info;

use kpath_domain::ports::EmbeddingProvider;

/// Default embedding dimension when no model overrides it
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;

/// Select the best available embedding provider
///
/// Prefers the pretrained sentence encoder; falls back to the statistical
/// TF-IDF embedder when the model cannot be materialized (offline hosts,
/// missing model cache). The fallback must be fitted by the index build
/// before it can embed.
pub fn create_best_embedder(model_name: &str, dimension: usize) -> Arc<dyn EmbeddingProvider> {
    #[cfg(feature = "fastembed")]
    {
        match FastEmbedProvider::from_name(model_name) {
            Ok(provider) => {
                info!(
                    model = model_name,
                    dimensions = provider.dimensions(),
                    "Using pretrained sentence encoder"
                );
                return Arc::new(provider);
            }
            Err(e) => {
                tracing::warn!(
                    "Pretrained encoder '{}' unavailable ({}), falling back to TF-IDF",
                    model_name, e
                );
            }
        }
    }
    #[cfg(not(feature = "fastembed"))]
    let _ = model_name;

    info!(dimension, "Using TF-IDF fallback embedder");
    Arc::new(TfidfEmbedder::new(dimension))
}
