//! Pretrained local embedding provider
//!
//! Implements the embedding port with the fastembed library, running ONNX
//! sentence encoders locally. The model lives inside an actor task and is
//! reached over a channel, so concurrent callers never contend on a lock
//! and the non-Sync model type stays off the API surface.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use kpath_domain::error::{Error, Result};
use kpath_domain::ports::EmbeddingProvider;
use kpath_domain::value_objects::Embedding;

/// Messages for the embedding actor
enum EmbedMessage {
    EmbedBatch {
        texts: Vec<String>,
        tx: oneshot::Sender<Result<Vec<Embedding>>>,
    },
}

/// Persisted reference to the pretrained model
///
/// The weights themselves are managed by the fastembed cache; the artifact
/// only records which model the indexes were built with.
#[derive(Serialize, Deserialize)]
struct ModelArtifact {
    provider: String,
    model: String,
    dimensions: usize,
}

/// Local pretrained sentence encoder
///
/// The first construction may block while model weights materialize; after
/// that, embedding is pure local inference.
pub struct FastEmbedProvider {
    sender: mpsc::Sender<EmbedMessage>,
    model_name: String,
    dimensions: usize,
}

impl FastEmbedProvider {
    /// Create a provider with the default model (AllMiniLML6V2, 384-dim)
    pub fn new() -> Result<Self> {
        Self::with_model(EmbeddingModel::AllMiniLML6V2)
    }

    /// Create a provider from a configured model name
    pub fn from_name(name: &str) -> Result<Self> {
        let model = match name {
            "" | "all-minilm-l6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
                EmbeddingModel::AllMiniLML6V2
            }
            "all-minilm-l12-v2" => EmbeddingModel::AllMiniLML12V2,
            "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            other => {
                return Err(Error::configuration(format!(
                    "Unknown embedding model '{}'",
                    other
                )))
            }
        };
        Self::with_model(model)
    }

    /// Create a provider with a specific fastembed model
    pub fn with_model(model: EmbeddingModel) -> Result<Self> {
        let dimensions = model_dimensions(&model);
        let model_name = format!("{:?}", model);
        let text_embedding =
            TextEmbedding::try_new(InitOptions::new(model).with_show_download_progress(false))
                .map_err(|e| {
                    Error::embedding(format!("Failed to initialize embedding model: {}", e))
                })?;

        let (tx, rx) = mpsc::channel(100);
        let mut actor = EmbedActor {
            receiver: rx,
            model: text_embedding,
            model_name: model_name.clone(),
            dimensions,
        };
        tokio::spawn(async move {
            actor.run().await;
        });

        Ok(Self {
            sender: tx,
            model_name,
            dimensions,
        })
    }

    /// Name of the loaded model
    pub fn model(&self) -> &str {
        &self.model_name
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(EmbedMessage::EmbedBatch {
                texts: texts.to_vec(),
                tx,
            })
            .await
            .map_err(|_| Error::embedding("Embedding actor channel closed"))?;

        rx.await
            .unwrap_or_else(|_| Err(Error::embedding("Embedding actor closed")))
    }

    async fn save(&self, path: &Path) -> Result<()> {
        let artifact = ModelArtifact {
            provider: "fastembed".to_string(),
            model: self.model_name.clone(),
            dimensions: self.dimensions,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::io_with_source("Failed to create model directory", e))?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&artifact)?)
            .map_err(|e| Error::io_with_source("Failed to write model artifact", e))?;
        Ok(())
    }

    async fn load(&self, path: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::io_with_source("Failed to read model artifact", e))?;
        let artifact: ModelArtifact = serde_json::from_str(&raw)?;
        if artifact.provider != "fastembed" || artifact.model != self.model_name {
            return Err(Error::configuration(format!(
                "Persisted model '{}/{}' does not match active model 'fastembed/{}'",
                artifact.provider, artifact.model, self.model_name
            )));
        }
        Ok(())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}

impl Clone for FastEmbedProvider {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            model_name: self.model_name.clone(),
            dimensions: self.dimensions,
        }
    }
}

fn model_dimensions(model: &EmbeddingModel) -> usize {
    match model {
        EmbeddingModel::AllMiniLML6V2 | EmbeddingModel::AllMiniLML12V2 => 384,
        EmbeddingModel::BGESmallENV15 => 384,
        _ => 384,
    }
}

/// Internal actor that owns the ONNX model
struct EmbedActor {
    receiver: mpsc::Receiver<EmbedMessage>,
    model: TextEmbedding,
    model_name: String,
    dimensions: usize,
}

impl EmbedActor {
    async fn run(&mut self) {
        while let Some(msg) = self.receiver.recv().await {
            match msg {
                EmbedMessage::EmbedBatch { texts, tx } => {
                    let _ = tx.send(self.embed_batch(&texts));
                }
            }
        }
    }

    /// Embed a batch, preserving order
    ///
    /// Blank inputs become zero vectors without touching the model. If the
    /// whole batch fails, each text is retried alone and failures degrade
    /// to zero vectors so one poisoned input cannot sink the batch.
    fn embed_batch(&mut self, texts: &[String]) -> Result<Vec<Embedding>> {
        let dimensions = self.dimensions;
        let mut results: Vec<Option<Embedding>> = vec![None; texts.len()];
        let mut pending: Vec<(usize, &str)> = Vec::new();

        for (index, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                results[index] = Some(Embedding::zeros(dimensions, self.model_name.clone()));
            } else {
                pending.push((index, text.as_str()));
            }
        }

        if !pending.is_empty() {
            let inputs: Vec<&str> = pending.iter().map(|(_, t)| *t).collect();
            match self.model.embed(inputs, None) {
                Ok(vectors) => {
                    for ((index, _), vector) in pending.iter().zip(vectors) {
                        results[*index] = Some(Embedding::new(vector, self.model_name.clone()));
                    }
                }
                Err(batch_error) => {
                    warn!(
                        "Batch embedding failed ({}), retrying items individually",
                        batch_error
                    );
                    for (index, text) in &pending {
                        match self.model.embed(vec![*text], None) {
                            Ok(mut vectors) if !vectors.is_empty() => {
                                results[*index] = Some(Embedding::new(
                                    vectors.remove(0),
                                    self.model_name.clone(),
                                ));
                            }
                            Ok(_) | Err(_) => {
                                results[*index] =
                                    Some(Embedding::zeros(dimensions, self.model_name.clone()));
                            }
                        }
                    }
                }
            }
        }

        Ok(results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Embedding::zeros(dimensions, self.model_name.clone())))
            .collect())
    }
}
