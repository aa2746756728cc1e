//! KPATH Enterprise server binary

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use kpath_application::{
    ArtifactLayout, FeedbackRanker, IndexLifecycleManager, PlannerOptions, QueryPlanner,
};
use kpath_domain::ports::{AuthStore, CatalogReader, EmbeddingProvider, FeedbackStore};
use kpath_infrastructure::config::AppConfig;
use kpath_infrastructure::logging::init_logging;
use kpath_infrastructure::ConfigLoader;
use kpath_providers::catalog::{InMemoryCatalog, PostgresCatalog};
use kpath_providers::embedding::create_best_embedder;
use kpath_server::state::AuthSettings;
use kpath_server::{build_router, AppState};

/// Semantic discovery service for machine-callable capabilities
#[derive(Parser)]
#[command(name = "kpath", version, about)]
struct Cli {
    /// Path to a configuration file (defaults to ./kpath.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port
    #[arg(long)]
    port: Option<u16>,

    /// Force a full index rebuild at startup
    #[arg(long)]
    rebuild: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    let mut config = loader.load().context("Failed to load configuration")?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    init_logging(&config.logging).context("Failed to initialize logging")?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting KPATH Enterprise");

    let state = build_state(&config, cli.rebuild)
        .await
        .context("Failed to initialize search subsystem")?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

/// Wire providers, restore or build indexes, and assemble shared state
async fn build_state(config: &AppConfig, force_rebuild: bool) -> anyhow::Result<AppState> {
    let (catalog, feedback, auth_store): (
        Arc<dyn CatalogReader>,
        Arc<dyn FeedbackStore>,
        Arc<dyn AuthStore>,
    ) = if config.database.url.is_empty() {
        warn!("No database configured; using the empty in-memory catalog");
        let store = Arc::new(InMemoryCatalog::new());
        (store.clone(), store.clone(), store)
    } else {
        let store = Arc::new(
            PostgresCatalog::connect(&config.database.url, config.database.pool_size)
                .context("Failed to connect to the catalog database")?,
        );
        (store.clone(), store.clone(), store)
    };

    let embedder: Arc<dyn EmbeddingProvider> = create_best_embedder(
        &config.search.embedding_model,
        config.search.embedding_dimension,
    );

    let layout = ArtifactLayout::new(&config.search.artifact_dir);
    let lifecycle = Arc::new(IndexLifecycleManager::new(
        embedder.clone(),
        catalog.clone(),
        layout,
    ));

    // Dimension mismatches between persisted artifacts and the active
    // model are fatal here, before the port binds
    let loaded = lifecycle.startup().await?;
    if force_rebuild || !loaded {
        lifecycle.initialize(force_rebuild).await?;
    }

    let ranker = Arc::new(FeedbackRanker::new(feedback.clone()));
    let planner = Arc::new(QueryPlanner::new(
        lifecycle.clone(),
        embedder,
        catalog,
        feedback.clone(),
        ranker.clone(),
        PlannerOptions {
            workflows_enabled: config.search.workflows_enabled,
        },
    ));

    Ok(AppState {
        planner,
        lifecycle,
        feedback,
        auth_store,
        ranker,
        auth: AuthSettings {
            jwt_secret: config.auth.jwt_secret.clone(),
            default_rate_limit: config.search.default_rate_limit,
        },
        request_timeout: Duration::from_secs(config.server.request_timeout_secs),
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
