//! Query planning and dispatch
//!
//! Takes a validated search request, dispatches it across one of the five
//! search modes, applies post-filters, hydrates catalog data, and assembles
//! the ordered response. Inside one request the sequence is strict:
//! embed → search → rerank → filter → hydrate.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use kpath_domain::entities::{Service, Tool};
use kpath_domain::error::{Error, Result};
use kpath_domain::ports::{CatalogReader, EmbeddingProvider, FeedbackStore};
use kpath_domain::value_objects::{
    EntityType, RecommendedTool, SearchMode, SearchRecord, SearchRequest, SearchResponse,
    ServiceView, ToolView, WorkflowData,
};

use crate::composer;
use crate::lifecycle::IndexLifecycleManager;
use crate::ranking::{blend, FeedbackRanker};
use crate::vector_index::similarity;

/// Over-fetch factor for vector search, leaving room for post-filters
const CANDIDATE_MULTIPLIER: usize = 3;
/// Minimum successful invocations before a pattern counts as a workflow
const WORKFLOW_MIN_INVOCATIONS: u64 = 2;

/// Planner feature switches
#[derive(Debug, Clone)]
pub struct PlannerOptions {
    /// Whether workflow-mode search is available
    pub workflows_enabled: bool,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            workflows_enabled: false,
        }
    }
}

/// Dispatches search requests across the five modes
pub struct QueryPlanner {
    lifecycle: Arc<IndexLifecycleManager>,
    embedder: Arc<dyn EmbeddingProvider>,
    catalog: Arc<dyn CatalogReader>,
    feedback: Arc<dyn FeedbackStore>,
    ranker: Arc<FeedbackRanker>,
    options: PlannerOptions,
}

impl QueryPlanner {
    pub fn new(
        lifecycle: Arc<IndexLifecycleManager>,
        embedder: Arc<dyn EmbeddingProvider>,
        catalog: Arc<dyn CatalogReader>,
        feedback: Arc<dyn FeedbackStore>,
        ranker: Arc<FeedbackRanker>,
        options: PlannerOptions,
    ) -> Self {
        Self {
            lifecycle,
            embedder,
            catalog,
            feedback,
            ranker,
            options,
        }
    }

    /// Execute a search request for the given principal
    pub async fn search(&self, request: &SearchRequest, user_id: i32) -> Result<SearchResponse> {
        let started = Instant::now();

        let results = match request.search_mode {
            SearchMode::AgentsOnly => self.agents_records(request, true).await?,
            SearchMode::ToolsOnly => self.tools_records(request).await?,
            SearchMode::AgentsAndTools => self.mixed_records(request).await?,
            SearchMode::Workflows => self.workflow_records(request).await?,
            SearchMode::Capabilities => self.capability_records(request).await?,
        };

        debug!(
            mode = request.search_mode.as_str(),
            results = results.len(),
            "Search complete"
        );

        Ok(SearchResponse {
            query: request.query.clone(),
            total_results: results.len(),
            results,
            search_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            user_id,
            timestamp: Utc::now(),
            search_mode: request.search_mode,
        })
    }

    /// Find services similar to an existing service
    ///
    /// Composes a query from the target's name, description, and capability
    /// names, then runs an agents-mode search excluding the target itself.
    pub async fn similar_services(
        &self,
        service_id: i32,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<SearchRecord>> {
        let service = self
            .catalog
            .service_by_id(service_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Service {}", service_id)))?;

        let mut query_parts = vec![service.name.clone(), service.description.clone()];
        for capability in &service.capabilities {
            if let Some(name) = &capability.name {
                query_parts.push(name.clone());
            }
        }

        let request = SearchRequest {
            query: query_parts.join(" "),
            limit: limit + 1,
            min_score,
            domains: None,
            capabilities: None,
            include_orchestration: false,
            search_mode: SearchMode::AgentsOnly,
        };

        let mut records: Vec<SearchRecord> = self
            .agents_records(&request, true)
            .await?
            .into_iter()
            .filter(|r| r.service_id != service_id)
            .take(limit)
            .collect();
        reassign_ranks(&mut records);
        Ok(records)
    }

    /// Embed the prepared form of a user query
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let prepared = composer::prepare_query(query);
        let embedding = self.embedder.embed(&prepared).await?;
        Ok(embedding.vector)
    }

    /// Agents mode: rank services, rerank with feedback, filter, hydrate
    async fn agents_records(
        &self,
        request: &SearchRequest,
        apply_rerank: bool,
    ) -> Result<Vec<SearchRecord>> {
        let query_vector = self.embed_query(&request.query).await?;
        let snapshot = self.lifecycle.snapshot()?;

        let raw = snapshot
            .services
            .search(&query_vector, request.limit * CANDIDATE_MULTIPLIER)?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }

        let ranked = if apply_rerank {
            self.ranker.rerank(&raw, &request.query).await
        } else {
            raw
        };

        let candidate_ids: Vec<i32> = ranked.iter().map(|(id, _)| *id).collect();
        let services: HashMap<i32, Service> = self
            .catalog
            .services_by_ids(&candidate_ids)
            .await?
            .into_iter()
            .filter(|s| s.status.is_active())
            .map(|s| (s.id, s))
            .collect();

        let tools_by_service = if request.include_orchestration {
            match self.catalog.tools_by_service(&candidate_ids).await {
                Ok(map) => map,
                Err(e) => {
                    warn!("Tool hydration failed, omitting orchestration detail: {}", e);
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        let mut records = Vec::new();
        for (service_id, score) in ranked {
            if records.len() >= request.limit {
                break;
            }
            if score < request.min_score {
                continue;
            }
            let Some(service) = services.get(&service_id) else {
                continue;
            };
            if !passes_filters(service, request) {
                continue;
            }

            let mut view = ServiceView::from_service(service);
            if request.include_orchestration {
                view.tools = Some(
                    tools_by_service
                        .get(&service_id)
                        .map(|tools| tools.iter().map(tool_view).collect())
                        .unwrap_or_default(),
                );
                view.orchestration = service.orchestration.clone();
            }

            records.push(SearchRecord {
                service_id,
                score,
                rank: 0,
                entity_type: EntityType::Service,
                service: view,
                recommended_tool: None,
                workflow_data: None,
                distance: None,
            });
        }

        reassign_ranks(&mut records);
        Ok(records)
    }

    /// Tools mode: rank tools, hydrate each parent with full connectivity
    async fn tools_records(&self, request: &SearchRequest) -> Result<Vec<SearchRecord>> {
        let query_vector = self.embed_query(&request.query).await?;
        let snapshot = self.lifecycle.snapshot()?;

        let raw = snapshot
            .tools
            .search(&query_vector, request.limit * CANDIDATE_MULTIPLIER)?;

        let mut records = Vec::new();
        for (tool_id, score) in raw {
            if records.len() >= request.limit {
                break;
            }
            if score < request.min_score {
                continue;
            }

            // Per-record catalog failures drop the record, not the response
            let tool = match self.catalog.tool_by_id(tool_id).await {
                Ok(Some(tool)) => tool,
                Ok(None) => continue,
                Err(e) => {
                    warn!(tool_id, "Tool hydration failed: {}", e);
                    continue;
                }
            };
            let service = match self.catalog.service_by_id(tool.service_id).await {
                Ok(Some(service)) if service.status.is_active() => service,
                Ok(_) => continue,
                Err(e) => {
                    warn!(tool_id, "Service hydration failed: {}", e);
                    continue;
                }
            };

            records.push(SearchRecord {
                service_id: service.id,
                score,
                rank: 0,
                entity_type: EntityType::ServiceWithTool,
                service: ServiceView::from_service(&service),
                recommended_tool: Some(RecommendedTool {
                    tool_id: tool.id,
                    tool_name: tool.tool_name.clone(),
                    tool_description: tool.description.clone(),
                    input_schema: tool.input_schema.clone(),
                    output_schema: tool.output_schema.clone(),
                    example_calls: tool.example_calls.clone(),
                    recommendation_score: score,
                    recommendation_reason: format!(
                        "Best match for '{}' based on tool capabilities",
                        request.query
                    ),
                }),
                workflow_data: None,
                distance: Some(1.0 - score),
            });
        }

        reassign_ranks(&mut records);
        Ok(records)
    }

    /// Mixed mode: merge agents and tools, rerank across the union
    async fn mixed_records(&self, request: &SearchRequest) -> Result<Vec<SearchRecord>> {
        let mut merged = self.agents_records(request, false).await?;
        merged.extend(self.tools_records(request).await?);
        if merged.is_empty() {
            return Ok(merged);
        }

        let candidate_ids: Vec<i32> = merged.iter().map(|r| r.service_id).collect();
        match self
            .ranker
            .feedback_component(&candidate_ids, &request.query)
            .await
        {
            Ok(feedback) => {
                for record in &mut merged {
                    let component = feedback.get(&record.service_id).copied().unwrap_or(0.0);
                    record.score = blend(record.score, component);
                    if let Some(tool) = &mut record.recommended_tool {
                        tool.recommendation_score = record.score;
                    }
                    if record.distance.is_some() {
                        record.distance = Some(1.0 - record.score);
                    }
                }
            }
            Err(e) => warn!("Feedback blending unavailable for mixed search: {}", e),
        }

        merged.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged.retain(|r| r.score >= request.min_score);
        merged.truncate(request.limit);
        reassign_ranks(&mut merged);
        Ok(merged)
    }

    /// Workflow mode: rank recurring invocation patterns
    async fn workflow_records(&self, request: &SearchRequest) -> Result<Vec<SearchRecord>> {
        if !self.options.workflows_enabled {
            return Err(Error::validation(
                "search_mode 'workflows' is not enabled on this deployment",
            ));
        }

        let patterns = self
            .feedback
            .workflow_patterns(WORKFLOW_MIN_INVOCATIONS)
            .await?;

        // Resolve names; patterns referencing vanished entities are skipped
        let mut workflows: Vec<(kpath_domain::value_objects::WorkflowPattern, Service, String)> =
            Vec::new();
        for pattern in patterns {
            let Some(initiator) = self.catalog.service_by_id(pattern.initiator_id).await? else {
                continue;
            };
            let Some(target) = self.catalog.service_by_id(pattern.target_id).await? else {
                continue;
            };
            let Some(tool) = self.catalog.tool_by_id(pattern.tool_id).await? else {
                continue;
            };
            let description =
                composer::workflow_description(&initiator.name, &target.name, &tool.tool_name);
            workflows.push((pattern, initiator, description));
        }
        if workflows.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embed_query(&request.query).await?;
        let texts: Vec<String> = workflows.iter().map(|(_, _, d)| d.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let mut scored: Vec<(usize, f32)> = embeddings
            .iter()
            .enumerate()
            .map(|(i, e)| (i, similarity(&query_vector, &e.vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut records = Vec::new();
        for (index, score) in scored {
            if records.len() >= request.limit {
                break;
            }
            if score < request.min_score {
                continue;
            }
            let (pattern, initiator, description) = &workflows[index];
            records.push(SearchRecord {
                service_id: pattern.initiator_id,
                score,
                rank: 0,
                entity_type: EntityType::Workflow,
                service: ServiceView::from_service(initiator),
                recommended_tool: None,
                workflow_data: Some(WorkflowData {
                    initiator_id: pattern.initiator_id,
                    target_id: pattern.target_id,
                    tool_id: pattern.tool_id,
                    invocation_count: pattern.invocation_count,
                    description: description.clone(),
                }),
                distance: Some(1.0 - score),
            });
        }

        reassign_ranks(&mut records);
        Ok(records)
    }

    /// Capabilities mode: rank capability rows and tools, one hit per service
    async fn capability_records(&self, request: &SearchRequest) -> Result<Vec<SearchRecord>> {
        let capabilities = self.catalog.active_capabilities().await?;
        let tools = self.catalog.active_tools().await?;

        let mut items: Vec<(String, i32)> = Vec::with_capacity(capabilities.len() + tools.len());
        for capability in &capabilities {
            items.push((composer::capability_line(capability), capability.service_id));
        }
        for tool in &tools {
            items.push((composer::tool_capability_line(tool), tool.service_id));
        }
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embed_query(&request.query).await?;
        let texts: Vec<String> = items.iter().map(|(text, _)| text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let mut scored: Vec<(usize, f32)> = embeddings
            .iter()
            .enumerate()
            .map(|(i, e)| (i, similarity(&query_vector, &e.vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        // First hit per service wins
        let mut selected: Vec<(i32, f32)> = Vec::new();
        for (index, score) in scored {
            if selected.len() >= request.limit {
                break;
            }
            if score < request.min_score {
                continue;
            }
            let service_id = items[index].1;
            if selected.iter().any(|(id, _)| *id == service_id) {
                continue;
            }
            selected.push((service_id, score));
        }
        if selected.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = selected.iter().map(|(id, _)| *id).collect();
        let services: HashMap<i32, Service> = self
            .catalog
            .services_by_ids(&ids)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        let mut records = Vec::new();
        for (service_id, score) in selected {
            let Some(service) = services.get(&service_id) else {
                continue;
            };
            records.push(SearchRecord {
                service_id,
                score,
                rank: 0,
                entity_type: EntityType::Capability,
                service: ServiceView::from_service(service),
                recommended_tool: None,
                workflow_data: None,
                distance: Some(1.0 - score),
            });
        }

        reassign_ranks(&mut records);
        Ok(records)
    }
}

/// Domain filter (case-insensitive exact) and capability filter
/// (case-insensitive substring of capability descriptions)
fn passes_filters(service: &Service, request: &SearchRequest) -> bool {
    if let Some(domains) = &request.domains {
        if !domains.is_empty() {
            let service_domains = service.domains_lowercase();
            let matched = domains
                .iter()
                .any(|d| service_domains.contains(&d.to_lowercase()));
            if !matched {
                return false;
            }
        }
    }

    if let Some(capabilities) = &request.capabilities {
        if !capabilities.is_empty() {
            let descriptions: Vec<String> = service
                .capabilities
                .iter()
                .map(|c| c.description.to_lowercase())
                .collect();
            let matched = capabilities.iter().any(|wanted| {
                let wanted = wanted.to_lowercase();
                descriptions.iter().any(|desc| desc.contains(&wanted))
            });
            if !matched {
                return false;
            }
        }
    }

    true
}

fn tool_view(tool: &Tool) -> ToolView {
    ToolView {
        tool_name: tool.tool_name.clone(),
        description: tool.description.clone(),
        input_schema: tool.input_schema.clone(),
        output_schema: tool.output_schema.clone(),
        example_calls: tool.example_calls.clone(),
        validation_rules: tool.validation_rules.clone(),
        tool_version: tool.version.clone(),
        is_active: tool.is_active,
        deprecation_date: tool.deprecation_date.map(|d| d.to_rfc3339()),
        deprecation_notice: tool.deprecation_notice.clone(),
    }
}

/// 1-based contiguous ranks in list order
fn reassign_ranks(records: &mut [SearchRecord]) {
    for (index, record) in records.iter_mut().enumerate() {
        record.rank = (index + 1) as u32;
    }
}
