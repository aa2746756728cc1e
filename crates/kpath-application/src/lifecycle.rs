//! Index lifecycle management
//!
//! Owns the build/load/persist state machine for the two vector indexes and
//! the embedder artifact. The current index generation lives behind an
//! atomic swap: readers grab an immutable snapshot without locking, writers
//! serialize on a mutex, persist to disk, and swap in the next generation.

use arc_swap::ArcSwapOption;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{info, warn};

use kpath_domain::error::{Error, Result};
use kpath_domain::ports::{CatalogReader, EmbeddingProvider};

use crate::composer;
use crate::vector_index::VectorIndex;

/// On-disk artifact locations under one root directory
///
/// Layout: `models/embedding_model.json` for the embedder,
/// `indexes/search_index.{json,vec}` and
/// `indexes/tool_search_index.{json,vec}` for the two indexes.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Embedder configuration and fitted parameters
    pub fn model_path(&self) -> PathBuf {
        self.root.join("models").join("embedding_model.json")
    }

    /// Service index base path (extensions appended by the index)
    pub fn service_index_base(&self) -> PathBuf {
        self.root.join("indexes").join("search_index")
    }

    /// Tool index base path
    pub fn tool_index_base(&self) -> PathBuf {
        self.root.join("indexes").join("tool_search_index")
    }

    fn staging_base(base: &Path) -> PathBuf {
        let mut name = base.as_os_str().to_os_string();
        name.push(".staged");
        PathBuf::from(name)
    }
}

/// One immutable generation of the search state
///
/// Shared read-only between concurrent requests; every mutation produces a
/// whole new snapshot.
#[derive(Debug)]
pub struct IndexSnapshot {
    pub services: VectorIndex,
    pub tools: VectorIndex,
    /// Tool id → owning service id
    pub tool_services: HashMap<i32, i32>,
}

/// Lifecycle state of the managed indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No usable index; searches fail with a retriable condition
    Uninitialized,
    /// Artifacts restored from disk at startup
    LoadedFromDisk,
    /// Built from the catalog during this process lifetime
    FreshlyBuilt,
}

impl LifecycleState {
    fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::LoadedFromDisk => "loaded_from_disk",
            LifecycleState::FreshlyBuilt => "freshly_built",
        }
    }
}

/// Embedder portion of the status report
#[derive(Debug, Clone, Serialize)]
pub struct EmbedderStatus {
    pub provider: String,
    pub dimensions: usize,
    pub fitted: bool,
}

/// Artifact file portion of the status report
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactStatus {
    pub model_exists: bool,
    pub service_index_exists: bool,
    pub tool_index_exists: bool,
    pub model_path: String,
    pub service_index_path: String,
    pub tool_index_path: String,
}

/// Point-in-time report for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatusReport {
    pub initialized: bool,
    pub index_built: bool,
    pub tool_index_built: bool,
    pub state: String,
    pub indexed_services: usize,
    pub indexed_tools: usize,
    pub dimension: usize,
    pub embedding_service: EmbedderStatus,
    pub files: ArtifactStatus,
}

/// Exclusive owner of the vector indexes and their artifacts
pub struct IndexLifecycleManager {
    embedder: Arc<dyn EmbeddingProvider>,
    catalog: Arc<dyn CatalogReader>,
    layout: ArtifactLayout,
    snapshot: ArcSwapOption<IndexSnapshot>,
    state: RwLock<LifecycleState>,
    /// Serializes build and single-entity mutations
    mutation: Mutex<()>,
}

impl IndexLifecycleManager {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        catalog: Arc<dyn CatalogReader>,
        layout: ArtifactLayout,
    ) -> Self {
        Self {
            embedder,
            catalog,
            layout,
            snapshot: ArcSwapOption::empty(),
            state: RwLock::new(LifecycleState::Uninitialized),
            mutation: Mutex::new(()),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        *self.state.read().expect("lifecycle state lock poisoned")
    }

    fn set_state(&self, state: LifecycleState) {
        *self.state.write().expect("lifecycle state lock poisoned") = state;
    }

    /// The current index generation, or a retriable unavailable error
    pub fn snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        self.snapshot
            .load_full()
            .ok_or_else(|| Error::index_unavailable("Search index not initialized"))
    }

    /// Attempt to restore persisted artifacts
    ///
    /// Returns whether a usable generation was loaded. Missing or corrupt
    /// artifacts are a soft failure (the manager stays uninitialized); a
    /// dimension mismatch between the loaded model and the loaded indexes
    /// is a fatal configuration error that must abort startup.
    pub async fn startup(&self) -> Result<bool> {
        let model_path = self.layout.model_path();
        if !model_path.exists()
            || !VectorIndex::exists(&self.layout.service_index_base())
            || !VectorIndex::exists(&self.layout.tool_index_base())
        {
            info!("No persisted search artifacts found");
            return Ok(false);
        }

        if let Err(e) = self.embedder.load(&model_path).await {
            warn!("Failed to load embedding model: {}", e);
            return Ok(false);
        }

        let (services, _) = match VectorIndex::load(&self.layout.service_index_base()) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("Failed to load service index: {}", e);
                return Ok(false);
            }
        };
        let (tools, tool_services) = match VectorIndex::load(&self.layout.tool_index_base()) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("Failed to load tool index: {}", e);
                return Ok(false);
            }
        };

        let dimension = self.embedder.dimensions();
        if services.dimension() != dimension || tools.dimension() != dimension {
            return Err(Error::configuration(format!(
                "Persisted index dimension ({} services / {} tools) does not match \
                 embedding model dimension {}",
                services.dimension(),
                tools.dimension(),
                dimension
            )));
        }

        info!(
            services = services.len(),
            tools = tools.len(),
            dimension,
            "Loaded persisted search artifacts"
        );
        self.snapshot.store(Some(Arc::new(IndexSnapshot {
            services,
            tools,
            tool_services: tool_services.unwrap_or_default(),
        })));
        self.set_state(LifecycleState::LoadedFromDisk);
        Ok(true)
    }

    /// Build indexes unless a loaded generation already serves
    ///
    /// With `force_rebuild` the catalog is always re-read and re-embedded.
    pub async fn initialize(&self, force_rebuild: bool) -> Result<()> {
        if !force_rebuild && self.state() != LifecycleState::Uninitialized {
            info!("Search index already initialized, skipping build");
            return Ok(());
        }
        self.build_from_catalog().await
    }

    /// Full recomputation from the catalog
    pub async fn rebuild(&self) -> Result<()> {
        self.build_from_catalog().await
    }

    async fn build_from_catalog(&self) -> Result<()> {
        let _guard = self.mutation.lock().await;
        info!("Building search indexes from catalog");

        let services = self.catalog.active_services().await?;
        let tools = self.catalog.active_tools().await?;

        let service_texts: Vec<String> = services.iter().map(composer::service_text).collect();
        let tool_texts: Vec<String> = tools.iter().map(composer::tool_text).collect();

        if !self.embedder.is_fitted() {
            let mut corpus: Vec<String> = Vec::with_capacity(services.len() + tools.len());
            corpus.extend(service_texts.iter().cloned());
            corpus.extend(tool_texts.iter().cloned());
            if corpus.is_empty() {
                corpus.push("default".to_string());
            }
            self.embedder.fit(&corpus).await?;
        }

        let dimension = self.embedder.dimensions();
        let service_matrix = self.embed_matrix(&service_texts, dimension).await?;
        let tool_matrix = self.embed_matrix(&tool_texts, dimension).await?;

        let mut service_index = VectorIndex::new(dimension);
        service_index.build(service_matrix, services.iter().map(|s| s.id).collect())?;

        let mut tool_index = VectorIndex::new(dimension);
        tool_index.build(tool_matrix, tools.iter().map(|t| t.id).collect())?;

        let tool_services: HashMap<i32, i32> =
            tools.iter().map(|t| (t.id, t.service_id)).collect();

        let next = Arc::new(IndexSnapshot {
            services: service_index,
            tools: tool_index,
            tool_services,
        });

        self.embedder.save(&self.layout.model_path()).await?;
        self.persist(Arc::clone(&next)).await?;

        info!(
            services = services.len(),
            tools = tools.len(),
            dimension,
            "Search indexes built"
        );
        self.snapshot.store(Some(next));
        self.set_state(LifecycleState::FreshlyBuilt);
        Ok(())
    }

    async fn embed_matrix(&self, texts: &[String], dimension: usize) -> Result<Vec<f32>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self.embedder.embed_batch(texts).await?;
        let mut matrix = Vec::with_capacity(texts.len() * dimension);
        for embedding in &embeddings {
            if embedding.vector.len() != dimension {
                return Err(Error::vector_index(format!(
                    "Embedder produced a {}-dimensional vector, expected {}",
                    embedding.vector.len(),
                    dimension
                )));
            }
            matrix.extend_from_slice(&embedding.vector);
        }
        Ok(matrix)
    }

    /// Stage both index files, then promote them with renames
    ///
    /// A failure while staging leaves the previous artifacts untouched, so
    /// a crashed or failed bulk build rolls back to the last good
    /// generation on the next load.
    async fn persist(&self, snapshot: Arc<IndexSnapshot>) -> Result<()> {
        let layout = self.layout.clone();
        tokio::task::spawn_blocking(move || persist_snapshot(&layout, &snapshot))
            .await
            .map_err(|e| Error::internal(format!("Index persistence task failed: {}", e)))?
    }

    /// Add one service to the service index
    ///
    /// Returns false when the catalog does not know the id. The tool index
    /// is untouched; tool changes go through [`Self::rebuild`].
    pub async fn add_service(&self, service_id: i32) -> Result<bool> {
        let _guard = self.mutation.lock().await;
        let current = self.snapshot()?;

        let Some(service) = self.catalog.service_by_id(service_id).await? else {
            return Ok(false);
        };
        if current.services.contains(service_id) {
            return Err(Error::invalid_argument(format!(
                "Service {} is already indexed",
                service_id
            )));
        }

        let embedding = self.embedder.embed(&composer::service_text(&service)).await?;
        let mut services = current.services.clone();
        services.add(service_id, &embedding.vector)?;

        self.swap_services(&current, services).await?;
        info!(service_id, "Added service to search index");
        Ok(true)
    }

    /// Re-embed one service in place
    pub async fn update_service(&self, service_id: i32) -> Result<bool> {
        let _guard = self.mutation.lock().await;
        let current = self.snapshot()?;

        let Some(service) = self.catalog.service_by_id(service_id).await? else {
            return Ok(false);
        };

        let embedding = self.embedder.embed(&composer::service_text(&service)).await?;
        let mut services = current.services.clone();
        if !services.update(service_id, &embedding.vector)? {
            return Ok(false);
        }

        self.swap_services(&current, services).await?;
        info!(service_id, "Updated service in search index");
        Ok(true)
    }

    /// Remove one service from the service index
    pub async fn remove_service(&self, service_id: i32) -> Result<bool> {
        let _guard = self.mutation.lock().await;
        let current = self.snapshot()?;

        let mut services = current.services.clone();
        if !services.remove(service_id) {
            return Ok(false);
        }

        self.swap_services(&current, services).await?;
        info!(service_id, "Removed service from search index");
        Ok(true)
    }

    async fn swap_services(
        &self,
        current: &Arc<IndexSnapshot>,
        services: VectorIndex,
    ) -> Result<()> {
        let next = Arc::new(IndexSnapshot {
            services,
            tools: current.tools.clone(),
            tool_services: current.tool_services.clone(),
        });
        self.persist(Arc::clone(&next)).await?;
        self.snapshot.store(Some(next));
        Ok(())
    }

    /// Status report for the API surface
    pub fn status(&self) -> IndexStatusReport {
        let snapshot = self.snapshot.load_full();
        let (indexed_services, indexed_tools, dimension) = snapshot
            .as_ref()
            .map(|s| (s.services.len(), s.tools.len(), s.services.dimension()))
            .unwrap_or((0, 0, self.embedder.dimensions()));

        IndexStatusReport {
            initialized: snapshot.is_some(),
            index_built: snapshot.is_some(),
            tool_index_built: snapshot.map(|s| !s.tools.is_empty()).unwrap_or(false),
            state: self.state().as_str().to_string(),
            indexed_services,
            indexed_tools,
            dimension,
            embedding_service: EmbedderStatus {
                provider: self.embedder.provider_name().to_string(),
                dimensions: self.embedder.dimensions(),
                fitted: self.embedder.is_fitted(),
            },
            files: ArtifactStatus {
                model_exists: self.layout.model_path().exists(),
                service_index_exists: VectorIndex::exists(&self.layout.service_index_base()),
                tool_index_exists: VectorIndex::exists(&self.layout.tool_index_base()),
                model_path: self.layout.model_path().display().to_string(),
                service_index_path: self.layout.service_index_base().display().to_string(),
                tool_index_path: self.layout.tool_index_base().display().to_string(),
            },
        }
    }
}

/// Write both indexes to staged bases, then promote with renames
fn persist_snapshot(layout: &ArtifactLayout, snapshot: &IndexSnapshot) -> Result<()> {
    let service_base = layout.service_index_base();
    let tool_base = layout.tool_index_base();
    let service_staged = ArtifactLayout::staging_base(&service_base);
    let tool_staged = ArtifactLayout::staging_base(&tool_base);

    snapshot.services.save(&service_staged, None)?;
    snapshot
        .tools
        .save(&tool_staged, Some(&snapshot.tool_services))?;

    promote(&service_staged, &service_base)?;
    promote(&tool_staged, &tool_base)?;
    Ok(())
}

fn promote(staged: &Path, final_base: &Path) -> Result<()> {
    for ext in ["json", "vec"] {
        let from = staged.with_file_name(format!(
            "{}.{}",
            staged.file_name().and_then(|n| n.to_str()).unwrap_or(""),
            ext
        ));
        let to = final_base.with_file_name(format!(
            "{}.{}",
            final_base.file_name().and_then(|n| n.to_str()).unwrap_or(""),
            ext
        ));
        fs::rename(&from, &to).map_err(|e| {
            Error::io_with_source(format!("Failed to promote index file {}", to.display()), e)
        })?;
    }
    Ok(())
}
