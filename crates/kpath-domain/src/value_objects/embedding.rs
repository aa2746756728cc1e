//! Semantic embedding value object

use serde::{Deserialize, Serialize};

/// A vector embedding of text content
///
/// ## Business Rules
///
/// - `dimensions` always equals `vector.len()`
/// - an empty or whitespace-only input text embeds to the zero vector of
///   the provider's dimensionality, not to an error
/// - the model name identifies the generation method so persisted indexes
///   can detect a provider change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embedding {
    /// The embedding vector values
    pub vector: Vec<f32>,
    /// Name of the model that generated this embedding
    pub model: String,
    /// Dimensionality of the embedding vector
    pub dimensions: usize,
}

impl Embedding {
    /// Create an embedding, deriving `dimensions` from the vector
    pub fn new<S: Into<String>>(vector: Vec<f32>, model: S) -> Self {
        let dimensions = vector.len();
        Self {
            vector,
            model: model.into(),
            dimensions,
        }
    }

    /// The zero vector of the given dimensionality
    pub fn zeros<S: Into<String>>(dimensions: usize, model: S) -> Self {
        Self {
            vector: vec![0.0; dimensions],
            model: model.into(),
            dimensions,
        }
    }

    /// Whether every component is zero
    pub fn is_zero(&self) -> bool {
        self.vector.iter().all(|v| *v == 0.0)
    }
}
