//! Null embedding provider for testing and development
//!
//! Deterministic hash-based embeddings with no external dependencies.
//! Tokens are hashed into a fixed number of buckets, so texts sharing
//! words produce genuinely similar vectors; good enough to exercise the
//! whole search pipeline offline.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use kpath_domain::error::Result;
use kpath_domain::ports::EmbeddingProvider;
use kpath_domain::value_objects::Embedding;

/// Dimension of null embeddings; small keeps tests fast
pub const NULL_EMBEDDING_DIMENSION: usize = 64;

/// Deterministic bag-of-words test embedder
#[derive(Debug, Default, Clone)]
pub struct NullEmbeddingProvider;

impl NullEmbeddingProvider {
    pub fn new() -> Self {
        Self
    }

    fn embed_one(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; NULL_EMBEDDING_DIMENSION];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() % NULL_EMBEDDING_DIMENSION as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for NullEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        Ok(texts
            .iter()
            .map(|text| Embedding::new(Self::embed_one(text), "null"))
            .collect())
    }

    async fn save(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                kpath_domain::Error::io_with_source("Failed to create model directory", e)
            })?;
        }
        let artifact = serde_json::json!({
            "provider": "null",
            "dimensions": NULL_EMBEDDING_DIMENSION,
        });
        std::fs::write(path, artifact.to_string())
            .map_err(|e| kpath_domain::Error::io_with_source("Failed to write model artifact", e))
    }

    async fn load(&self, path: &std::path::Path) -> Result<()> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| kpath_domain::Error::io_with_source("Failed to read model artifact", e))?;
        let artifact: serde_json::Value = serde_json::from_str(&raw)?;
        if artifact.get("provider").and_then(|p| p.as_str()) != Some("null") {
            return Err(kpath_domain::Error::configuration(
                "Persisted model does not match the null provider",
            ));
        }
        Ok(())
    }

    fn dimensions(&self) -> usize {
        NULL_EMBEDDING_DIMENSION
    }

    fn provider_name(&self) -> &str {
        "null"
    }
}
