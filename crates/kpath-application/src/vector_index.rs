//! In-process vector index
//!
//! An owned contiguous buffer of n×D 32-bit floats with a parallel id list
//! and an id→position map. Exact brute-force cosine search with heap-based
//! top-k selection; no approximate structures. Two instances back the
//! service and tool indexes.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use kpath_domain::error::{Error, Result};

/// JSON header written next to the raw vector file
#[derive(Debug, Serialize, Deserialize)]
struct IndexHeader {
    dimension: usize,
    ids: Vec<i32>,
    /// Tool id → owning service id, present only on the tool index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    service_map: Option<HashMap<i32, i32>>,
}

/// Exact k-nearest-neighbor index over catalog entity vectors
///
/// ## Invariants
///
/// - `ids.len() * dimension == vectors.len()` at all times
/// - the id→position map is injective; every id maps to exactly one row
/// - all stored vectors share the declared dimension
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    ids: Vec<i32>,
    positions: HashMap<i32, usize>,
    /// Row-major n×dimension matrix
    vectors: Vec<f32>,
}

impl VectorIndex {
    /// Create an empty index with a fixed dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            positions: HashMap::new(),
            vectors: Vec::new(),
        }
    }

    /// Declared vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed entities
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the index holds no vectors
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Indexed ids in position order
    pub fn ids(&self) -> &[i32] {
        &self.ids
    }

    /// Whether the id is indexed
    pub fn contains(&self, id: i32) -> bool {
        self.positions.contains_key(&id)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::vector_index(format!(
                "Vector dimension {} does not match index dimension {}",
                vector.len(),
                self.dimension
            )));
        }
        Ok(())
    }

    fn row(&self, position: usize) -> &[f32] {
        let start = position * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    /// Append a vector for a new id
    ///
    /// Duplicate ids are rejected; use [`VectorIndex::update`] instead.
    pub fn add(&mut self, id: i32, vector: &[f32]) -> Result<()> {
        self.check_dimension(vector)?;
        if self.positions.contains_key(&id) {
            return Err(Error::invalid_argument(format!(
                "Id {} is already indexed",
                id
            )));
        }
        self.positions.insert(id, self.ids.len());
        self.ids.push(id);
        self.vectors.extend_from_slice(vector);
        Ok(())
    }

    /// Remove an id, compacting by swap-remove
    ///
    /// Returns false when the id is not indexed. The position of the last
    /// row changes; the id↔position invariant is preserved.
    pub fn remove(&mut self, id: i32) -> bool {
        let Some(position) = self.positions.remove(&id) else {
            return false;
        };
        let last = self.ids.len() - 1;
        if position != last {
            let moved_id = self.ids[last];
            self.ids.swap(position, last);
            for d in 0..self.dimension {
                self.vectors[position * self.dimension + d] =
                    self.vectors[last * self.dimension + d];
            }
            self.positions.insert(moved_id, position);
        }
        self.ids.truncate(last);
        self.vectors.truncate(last * self.dimension);
        true
    }

    /// Replace the vector stored for an id in place
    ///
    /// Returns false when the id is not indexed.
    pub fn update(&mut self, id: i32, vector: &[f32]) -> Result<bool> {
        self.check_dimension(vector)?;
        let Some(&position) = self.positions.get(&id) else {
            return Ok(false);
        };
        let start = position * self.dimension;
        self.vectors[start..start + self.dimension].copy_from_slice(vector);
        Ok(true)
    }

    /// Atomic bulk replacement of the whole index
    ///
    /// `matrix` is row-major with one row per entry of `ids`.
    pub fn build(&mut self, matrix: Vec<f32>, ids: Vec<i32>) -> Result<()> {
        if matrix.len() != ids.len() * self.dimension {
            return Err(Error::vector_index(format!(
                "Matrix of {} floats does not hold {} rows of dimension {}",
                matrix.len(),
                ids.len(),
                self.dimension
            )));
        }
        let mut positions = HashMap::with_capacity(ids.len());
        for (position, id) in ids.iter().enumerate() {
            if positions.insert(*id, position).is_some() {
                return Err(Error::invalid_argument(format!(
                    "Duplicate id {} in bulk build",
                    id
                )));
            }
        }
        self.ids = ids;
        self.positions = positions;
        self.vectors = matrix;
        Ok(())
    }

    /// K-nearest-neighbor search
    ///
    /// Returns up to `min(k, len)` `(id, score)` pairs ordered by
    /// descending score. A zero query vector yields scores of 0 rather
    /// than an error; an empty index yields an empty list.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(i32, f32)>> {
        self.check_dimension(query)?;
        if self.ids.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let k = k.min(self.ids.len());
        let query_norm = norm(query);

        let mut heap: BinaryHeap<ScoredItem> = BinaryHeap::with_capacity(k + 1);
        for position in 0..self.ids.len() {
            let score = similarity_with_norm(query, self.row(position), query_norm);
            if heap.len() < k {
                heap.push(ScoredItem { score, position });
            } else if let Some(min) = heap.peek() {
                if score > min.score {
                    heap.pop();
                    heap.push(ScoredItem { score, position });
                }
            }
        }

        let mut items: Vec<ScoredItem> = heap.into_iter().collect();
        items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        Ok(items
            .into_iter()
            .map(|item| (self.ids[item.position], item.score))
            .collect())
    }

    /// Persist the index to `{base}.json` + `{base}.vec`
    ///
    /// Both files are written to a temporary sibling first and renamed into
    /// place so a concurrent reader never observes a partial write.
    pub fn save(&self, base: &Path, service_map: Option<&HashMap<i32, i32>>) -> Result<()> {
        if let Some(parent) = base.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::io_with_source("Failed to create index directory", e))?;
        }

        let header = IndexHeader {
            dimension: self.dimension,
            ids: self.ids.clone(),
            service_map: service_map.cloned(),
        };
        let header_json = serde_json::to_string_pretty(&header)?;

        let mut bytes = Vec::with_capacity(self.vectors.len() * 4);
        for value in &self.vectors {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        write_atomic(&header_path(base), header_json.as_bytes())?;
        write_atomic(&vectors_path(base), &bytes)?;
        Ok(())
    }

    /// Load an index persisted with [`VectorIndex::save`]
    ///
    /// Returns the index and the tool→service map if one was stored.
    pub fn load(base: &Path) -> Result<(Self, Option<HashMap<i32, i32>>)> {
        let header_raw = fs::read_to_string(header_path(base)).map_err(|e| {
            Error::io_with_source(format!("Failed to read index header {}", base.display()), e)
        })?;
        let header: IndexHeader = serde_json::from_str(&header_raw)?;

        let bytes = fs::read(vectors_path(base)).map_err(|e| {
            Error::io_with_source(format!("Failed to read vectors {}", base.display()), e)
        })?;
        let expected = header.ids.len() * header.dimension * 4;
        if bytes.len() != expected {
            return Err(Error::vector_index(format!(
                "Vector file {} holds {} bytes, expected {}",
                vectors_path(base).display(),
                bytes.len(),
                expected
            )));
        }

        let mut vectors = Vec::with_capacity(header.ids.len() * header.dimension);
        for chunk in bytes.chunks_exact(4) {
            vectors.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }

        let mut positions = HashMap::with_capacity(header.ids.len());
        for (position, id) in header.ids.iter().enumerate() {
            if positions.insert(*id, position).is_some() {
                return Err(Error::vector_index(format!(
                    "Duplicate id {} in persisted index {}",
                    id,
                    base.display()
                )));
            }
        }

        Ok((
            Self {
                dimension: header.dimension,
                ids: header.ids,
                positions,
                vectors,
            },
            header.service_map,
        ))
    }

    /// Whether both files of a persisted index exist
    pub fn exists(base: &Path) -> bool {
        header_path(base).exists() && vectors_path(base).exists()
    }
}

fn header_path(base: &Path) -> PathBuf {
    with_extension(base, "json")
}

fn vectors_path(base: &Path) -> PathBuf {
    with_extension(base, "vec")
}

fn with_extension(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = with_extension(path, "tmp");
    fs::write(&tmp, bytes)
        .map_err(|e| Error::io_with_source(format!("Failed to write {}", tmp.display()), e))?;
    fs::rename(&tmp, path)
        .map_err(|e| Error::io_with_source(format!("Failed to rename {}", path.display()), e))?;
    Ok(())
}

/// Scored row for heap-based top-k selection
///
/// Ordering is reversed so `BinaryHeap` behaves as a min-heap with the
/// weakest candidate on top.
#[derive(PartialEq)]
struct ScoredItem {
    score: f32,
    position: usize,
}

impl Eq for ScoredItem {}

impl Ord for ScoredItem {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for ScoredItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// L2 norm of a vector
pub fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity mapped into [0, 1]
///
/// A zero vector on either side scores 0 rather than erroring.
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    similarity_with_norm(a, b, norm(a))
}

fn similarity_with_norm(a: &[f32], b: &[f32], norm_a: f32) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_b = norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b) + 1.0) / 2.0
    }
}
