//! Shared fixtures for the application test suite
//!
//! Uses real providers (in-memory catalog, deterministic null embedder),
//! not mocks, so the pipeline under test is the shipping code path.

use std::sync::Arc;

use kpath_application::{
    ArtifactLayout, FeedbackRanker, IndexLifecycleManager, PlannerOptions, QueryPlanner,
};
use kpath_domain::entities::{Capability, Service, ServiceStatus, Tool};
use kpath_providers::catalog::InMemoryCatalog;
use kpath_providers::embedding::NullEmbeddingProvider;

pub fn service(id: i32, name: &str, description: &str) -> Service {
    Service {
        id,
        name: name.to_string(),
        description: description.to_string(),
        endpoint: Some(format!("https://svc-{}.internal/api", id)),
        version: Some("1.0.0".to_string()),
        status: ServiceStatus::Active,
        tool_type: Some("API".to_string()),
        visibility: Some("internal".to_string()),
        interaction_modes: vec!["sync".to_string()],
        default_timeout_ms: Some(30_000),
        default_retry_policy: None,
        success_criteria: None,
        capabilities: Vec::new(),
        domains: Vec::new(),
        tags: Vec::new(),
        integration_details: None,
        agent_protocol: None,
        orchestration: None,
    }
}

pub fn with_capability(mut service: Service, cap_id: i32, name: &str, desc: &str) -> Service {
    service.capabilities.push(Capability {
        id: cap_id,
        service_id: service.id,
        name: Some(name.to_string()),
        description: desc.to_string(),
        input_schema: None,
        output_schema: None,
    });
    service
}

pub fn with_domain(mut service: Service, domain: &str) -> Service {
    service.domains.push(domain.to_string());
    service
}

pub fn tool(id: i32, service_id: i32, name: &str, description: &str) -> Tool {
    Tool {
        id,
        service_id,
        service_name: String::new(),
        tool_name: name.to_string(),
        description: description.to_string(),
        input_schema: None,
        output_schema: None,
        example_calls: None,
        validation_rules: None,
        version: Some("1.0".to_string()),
        is_active: true,
        deprecation_date: None,
        deprecation_notice: None,
    }
}

pub struct TestStack {
    pub catalog: Arc<InMemoryCatalog>,
    pub lifecycle: Arc<IndexLifecycleManager>,
    pub planner: Arc<QueryPlanner>,
    pub ranker: Arc<FeedbackRanker>,
    // Held so artifacts outlive the stack
    pub _artifacts: tempfile::TempDir,
}

/// A full search stack over a fresh in-memory catalog and a temp artifact
/// directory; indexes are not built until `initialize`
pub fn stack(workflows_enabled: bool) -> TestStack {
    let artifacts = tempfile::tempdir().expect("tempdir");
    let catalog = Arc::new(InMemoryCatalog::new());
    let embedder = Arc::new(NullEmbeddingProvider::new());
    let lifecycle = Arc::new(IndexLifecycleManager::new(
        embedder.clone(),
        catalog.clone(),
        ArtifactLayout::new(artifacts.path()),
    ));
    let ranker = Arc::new(FeedbackRanker::new(catalog.clone()));
    let planner = Arc::new(QueryPlanner::new(
        lifecycle.clone(),
        embedder,
        catalog.clone(),
        catalog.clone(),
        ranker.clone(),
        PlannerOptions { workflows_enabled },
    ));
    TestStack {
        catalog,
        lifecycle,
        planner,
        ranker,
        _artifacts: artifacts,
    }
}
