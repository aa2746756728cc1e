//! Statistical fallback embedder
//!
//! Term-frequency features with sublinear scaling and smooth inverse
//! document frequency, projected to a fixed dimension by a truncated
//! singular-value decomposition. Fit once on the catalog corpus; embedding
//! afterwards is stateless and deterministic.
//!
//! The SVD is computed by power iteration with deflation on the n×n Gram
//! matrix, which stays small for catalog-sized corpora. Iteration starts
//! from a seeded pseudo-random vector so two fits of the same corpus
//! produce bitwise-identical projections.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use tracing::info;

use kpath_domain::error::{Error, Result};
use kpath_domain::ports::EmbeddingProvider;
use kpath_domain::value_objects::Embedding;

/// Cap on vocabulary size
const MAX_FEATURES: usize = 10_000;
/// Power iteration rounds per singular vector
const POWER_ITERATIONS: usize = 100;
/// Eigenvalues below this are treated as rank exhaustion
const EIGENVALUE_FLOOR: f32 = 1e-8;
/// Seed for the iteration start vectors
const SVD_SEED: u64 = 42;

/// English stop words excluded from the vocabulary
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "him", "his", "how",
    "if", "in", "into", "is", "it", "its", "itself", "just", "me", "more", "most", "my", "no",
    "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "ours", "out",
    "over", "own", "same", "she", "should", "so", "some", "such", "than", "that", "the", "their",
    "theirs", "them", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "you", "your", "yours",
];

/// Fitted model parameters, persisted as one JSON artifact
#[derive(Serialize, Deserialize)]
struct FittedModel {
    provider: String,
    dimension: usize,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
    /// Right singular vectors, one row of vocabulary length per component
    components: Vec<Vec<f32>>,
}

/// TF-IDF + truncated SVD embedder
///
/// Must be fitted (or loaded) before the first `embed` call. The fitted
/// dimension may be lower than the requested one when the corpus has less
/// rank; callers read [`EmbeddingProvider::dimensions`] after fitting.
pub struct TfidfEmbedder {
    target_dimension: usize,
    model: RwLock<Option<FittedModel>>,
}

impl TfidfEmbedder {
    pub fn new(target_dimension: usize) -> Self {
        Self {
            target_dimension,
            model: RwLock::new(None),
        }
    }

    /// Unigrams and bigrams of lowercased word tokens (≥2 chars), with
    /// stop words removed before bigram formation
    fn tokenize(text: &str) -> Vec<String> {
        let words: Vec<String> = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() >= 2)
            .filter(|w| !STOP_WORDS.contains(w))
            .map(str::to_string)
            .collect();

        let mut terms = words.clone();
        for pair in words.windows(2) {
            terms.push(format!("{} {}", pair[0], pair[1]));
        }
        terms
    }

    /// Sublinear-tf, idf-weighted, l2-normalized sparse row
    fn weighted_row(model: &FittedModel, text: &str) -> Vec<(usize, f32)> {
        let mut counts: HashMap<usize, f32> = HashMap::new();
        for term in Self::tokenize(text) {
            if let Some(&column) = model.vocabulary.get(&term) {
                *counts.entry(column).or_insert(0.0) += 1.0;
            }
        }

        let mut row: Vec<(usize, f32)> = counts
            .into_iter()
            .map(|(column, tf)| (column, (1.0 + tf.ln()) * model.idf[column]))
            .collect();

        let norm = row.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            for (_, w) in &mut row {
                *w /= norm;
            }
        }
        row.sort_unstable_by_key(|(column, _)| *column);
        row
    }

    fn project(model: &FittedModel, row: &[(usize, f32)]) -> Vec<f32> {
        let mut vector = vec![0.0f32; model.dimension];
        for (component, out) in model.components.iter().zip(vector.iter_mut()) {
            *out = row.iter().map(|(column, w)| component[*column] * w).sum();
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for TfidfEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let guard = self.model.read().expect("tfidf model lock poisoned");
        let model = guard
            .as_ref()
            .ok_or_else(|| Error::embedding("TF-IDF embedder used before fit"))?;

        Ok(texts
            .iter()
            .map(|text| {
                if text.trim().is_empty() {
                    Embedding::zeros(model.dimension, "tfidf-svd")
                } else {
                    let row = Self::weighted_row(model, text);
                    Embedding::new(Self::project(model, &row), "tfidf-svd")
                }
            })
            .collect())
    }

    async fn fit(&self, corpus: &[String]) -> Result<()> {
        if corpus.is_empty() {
            return Err(Error::invalid_argument("Cannot fit on an empty corpus"));
        }

        // Document terms and document frequencies
        let documents: Vec<Vec<String>> = corpus.iter().map(|t| Self::tokenize(t)).collect();
        let mut term_counts: HashMap<String, (u64, u64)> = HashMap::new(); // (total, df)
        for terms in &documents {
            let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
            for term in terms {
                let entry = term_counts.entry(term.clone()).or_insert((0, 0));
                entry.0 += 1;
                if seen.insert(term.as_str()) {
                    entry.1 += 1;
                }
            }
        }
        if term_counts.is_empty() {
            return Err(Error::invalid_argument(
                "Corpus produced no terms to fit on",
            ));
        }

        // Keep the most frequent terms, columns in lexicographic order
        let mut by_frequency: Vec<(String, u64, u64)> = term_counts
            .into_iter()
            .map(|(term, (total, df))| (term, total, df))
            .collect();
        by_frequency.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        by_frequency.truncate(MAX_FEATURES);
        by_frequency.sort_by(|a, b| a.0.cmp(&b.0));

        let n_docs = corpus.len();
        let mut vocabulary = HashMap::with_capacity(by_frequency.len());
        let mut idf = Vec::with_capacity(by_frequency.len());
        for (column, (term, _, df)) in by_frequency.iter().enumerate() {
            vocabulary.insert(term.clone(), column);
            idf.push(((1.0 + n_docs as f32) / (1.0 + *df as f32)).ln() + 1.0);
        }

        // Weighted document rows
        let staging = FittedModel {
            provider: "tfidf".to_string(),
            dimension: 0,
            vocabulary,
            idf,
            components: Vec::new(),
        };
        let rows: Vec<Vec<(usize, f32)>> = corpus
            .iter()
            .map(|text| Self::weighted_row(&staging, text))
            .collect();

        let vocab_size = staging.idf.len();
        let k = self
            .target_dimension
            .min(vocab_size)
            .min(n_docs.saturating_sub(1).max(1));

        let components = truncated_svd_components(&rows, vocab_size, k);
        let dimension = components.len();

        info!(
            documents = n_docs,
            vocabulary = vocab_size,
            dimension,
            "Fitted TF-IDF embedder"
        );

        let fitted = FittedModel {
            dimension,
            components,
            ..staging
        };
        *self.model.write().expect("tfidf model lock poisoned") = Some(fitted);
        Ok(())
    }

    async fn save(&self, path: &Path) -> Result<()> {
        let guard = self.model.read().expect("tfidf model lock poisoned");
        let model = guard
            .as_ref()
            .ok_or_else(|| Error::embedding("Cannot save an unfitted model"))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::io_with_source("Failed to create model directory", e))?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(model)?)
            .map_err(|e| Error::io_with_source("Failed to write model artifact", e))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| Error::io_with_source("Failed to finalize model artifact", e))?;
        Ok(())
    }

    async fn load(&self, path: &Path) -> Result<()> {
        let raw = std::fs::read(path)
            .map_err(|e| Error::io_with_source("Failed to read model artifact", e))?;
        let model: FittedModel = serde_json::from_slice(&raw)?;
        if model.provider != "tfidf" {
            return Err(Error::configuration(format!(
                "Persisted model provider '{}' does not match active provider 'tfidf'",
                model.provider
            )));
        }
        if model.components.len() != model.dimension {
            return Err(Error::configuration(
                "Persisted model components do not match its dimension",
            ));
        }
        *self.model.write().expect("tfidf model lock poisoned") = Some(model);
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.model
            .read()
            .expect("tfidf model lock poisoned")
            .is_some()
    }

    fn dimensions(&self) -> usize {
        self.model
            .read()
            .expect("tfidf model lock poisoned")
            .as_ref()
            .map(|m| m.dimension)
            .unwrap_or(self.target_dimension)
    }

    fn provider_name(&self) -> &str {
        "tfidf"
    }
}

/// Top-k right singular vectors of the sparse row matrix
///
/// Power iteration with deflation over the Gram matrix X·Xᵀ. Returns fewer
/// than `k` components when the corpus rank is exhausted.
fn truncated_svd_components(
    rows: &[Vec<(usize, f32)>],
    vocab_size: usize,
    k: usize,
) -> Vec<Vec<f32>> {
    let n = rows.len();

    // Gram matrix (n×n); rows are l2-normalized so entries are cosines
    let mut gram = vec![vec![0.0f32; n]; n];
    for i in 0..n {
        for j in i..n {
            let dot = sparse_dot(&rows[i], &rows[j]);
            gram[i][j] = dot;
            gram[j][i] = dot;
        }
    }

    let mut rng = StdRng::seed_from_u64(SVD_SEED);
    let mut eigenvectors: Vec<(Vec<f32>, f32)> = Vec::new();

    for _ in 0..k {
        let mut v: Vec<f32> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        orthogonalize(&mut v, &eigenvectors);
        if normalize(&mut v) < EIGENVALUE_FLOOR {
            break;
        }

        let mut eigenvalue = 0.0f32;
        for _ in 0..POWER_ITERATIONS {
            let mut next = mat_vec(&gram, &v);
            orthogonalize(&mut next, &eigenvectors);
            eigenvalue = normalize(&mut next);
            if eigenvalue < EIGENVALUE_FLOOR {
                break;
            }
            v = next;
        }
        if eigenvalue < EIGENVALUE_FLOOR {
            break;
        }
        eigenvectors.push((v, eigenvalue));
    }

    // Right singular vectors: w = Xᵀ u / σ
    eigenvectors
        .into_iter()
        .map(|(u, eigenvalue)| {
            let sigma = eigenvalue.sqrt();
            let mut component = vec![0.0f32; vocab_size];
            for (row, weight) in rows.iter().zip(u.iter()) {
                for (column, value) in row {
                    component[*column] += value * weight;
                }
            }
            for value in &mut component {
                *value /= sigma;
            }
            component
        })
        .collect()
}

fn sparse_dot(a: &[(usize, f32)], b: &[(usize, f32)]) -> f32 {
    let mut sum = 0.0;
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}

fn mat_vec(matrix: &[Vec<f32>], v: &[f32]) -> Vec<f32> {
    matrix
        .iter()
        .map(|row| row.iter().zip(v.iter()).map(|(a, b)| a * b).sum())
        .collect()
}

/// Project out previously found eigenvectors
fn orthogonalize(v: &mut [f32], found: &[(Vec<f32>, f32)]) {
    for (u, _) in found {
        let projection: f32 = v.iter().zip(u.iter()).map(|(a, b)| a * b).sum();
        for (value, basis) in v.iter_mut().zip(u.iter()) {
            *value -= projection * basis;
        }
    }
}

/// Normalize in place, returning the pre-normalization norm
fn normalize(v: &mut [f32]) -> f32 {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in v.iter_mut() {
            *value /= norm;
        }
    }
    norm
}
