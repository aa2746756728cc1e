//! Search request/response value objects
//!
//! These types define the wire contract of the search subsystem. Field
//! names are part of the external interface and must not drift; responses
//! may grow fields over time but never rename existing ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::{AgentProtocol, IntegrationDetails, Service};

/// Dispatch strategy for a search request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Rank services against the query (the default)
    #[default]
    AgentsOnly,
    /// Rank tools, returning each tool's parent service with full
    /// connectivity metadata and a recommended-tool record
    ToolsOnly,
    /// Union of the two preceding modes, re-ranked by score
    AgentsAndTools,
    /// Rank observed invocation patterns (initiator → target via tool)
    Workflows,
    /// Rank individual capability rows and tools, deduplicated by service
    Capabilities,
}

impl SearchMode {
    /// Wire name of the mode, e.g. `agents_only`
    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::AgentsOnly => "agents_only",
            SearchMode::ToolsOnly => "tools_only",
            SearchMode::AgentsAndTools => "agents_and_tools",
            SearchMode::Workflows => "workflows",
            SearchMode::Capabilities => "capabilities",
        }
    }
}

/// A validated search request
///
/// Constructed by the API layer after validation; the planner assumes the
/// constraints hold (non-empty query, limit in 1..=100, min_score in 0..=1).
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    pub min_score: f32,
    /// Case-insensitive exact match against service domain tags
    pub domains: Option<Vec<String>>,
    /// Case-insensitive substring match against capability descriptions
    pub capabilities: Option<Vec<String>>,
    pub include_orchestration: bool,
    pub search_mode: SearchMode,
}

impl SearchRequest {
    /// A request with default limit (10) and no filters
    pub fn new<S: Into<String>>(query: S) -> Self {
        Self {
            query: query.into(),
            limit: 10,
            min_score: 0.0,
            domains: None,
            capabilities: None,
            include_orchestration: false,
            search_mode: SearchMode::default(),
        }
    }
}

/// What kind of entity a result record represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Service,
    ServiceWithTool,
    Workflow,
    Capability,
}

/// Hydrated service data embedded in a result record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceView {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub endpoint: Option<String>,
    pub version: Option<String>,
    pub status: String,
    pub tool_type: Option<String>,
    pub visibility: Option<String>,
    pub interaction_modes: Vec<String>,
    pub capabilities: Vec<String>,
    pub domains: Vec<String>,
    pub tags: Vec<String>,
    pub default_timeout_ms: Option<i64>,
    pub default_retry_policy: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_criteria: Option<Value>,
    pub integration_details: Option<IntegrationDetails>,
    pub agent_protocol_details: Option<AgentProtocol>,
    /// Tool list, present only when orchestration detail was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolView>>,
    /// Opaque orchestration metadata, present only when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orchestration: Option<Value>,
}

impl ServiceView {
    /// Project a service entity into the response shape
    pub fn from_service(service: &Service) -> Self {
        Self {
            id: service.id,
            name: service.name.clone(),
            description: service.description.clone(),
            endpoint: service.endpoint.clone(),
            version: service.version.clone(),
            status: match service.status {
                crate::entities::ServiceStatus::Active => "active".to_string(),
                crate::entities::ServiceStatus::Inactive => "inactive".to_string(),
                crate::entities::ServiceStatus::Deprecated => "deprecated".to_string(),
            },
            tool_type: service.tool_type.clone(),
            visibility: service.visibility.clone(),
            interaction_modes: service.interaction_modes.clone(),
            capabilities: service
                .capabilities
                .iter()
                .map(|c| c.description.clone())
                .collect(),
            domains: service.domains.clone(),
            tags: service.tags.clone(),
            default_timeout_ms: service.default_timeout_ms,
            default_retry_policy: service.default_retry_policy.clone(),
            success_criteria: service.success_criteria.clone(),
            integration_details: service.integration_details.clone(),
            agent_protocol_details: service.agent_protocol.clone(),
            tools: None,
            orchestration: None,
        }
    }
}

/// Tool detail attached to a service view when orchestration is requested
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolView {
    pub tool_name: String,
    pub description: String,
    pub input_schema: Option<Value>,
    pub output_schema: Option<Value>,
    pub example_calls: Option<Value>,
    pub validation_rules: Option<Value>,
    pub tool_version: Option<String>,
    pub is_active: bool,
    pub deprecation_date: Option<String>,
    pub deprecation_notice: Option<String>,
}

/// The tool a tools-mode search recommends for the query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedTool {
    pub tool_id: i32,
    pub tool_name: String,
    pub tool_description: String,
    pub input_schema: Option<Value>,
    pub output_schema: Option<Value>,
    pub example_calls: Option<Value>,
    pub recommendation_score: f32,
    pub recommendation_reason: String,
}

/// Invocation-pattern detail attached to workflow-mode records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowData {
    pub initiator_id: i32,
    pub target_id: i32,
    pub tool_id: i32,
    pub invocation_count: u64,
    pub description: String,
}

/// A single ranked search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRecord {
    pub service_id: i32,
    /// Semantic similarity blended with feedback signals, in [0, 1]
    pub score: f32,
    /// 1-based position; contiguous within a response
    pub rank: u32,
    pub entity_type: EntityType,
    pub service: ServiceView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_tool: Option<RecommendedTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_data: Option<WorkflowData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
}

/// An ordered search response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchRecord>,
    pub total_results: usize,
    pub search_time_ms: f64,
    pub user_id: i32,
    pub timestamp: DateTime<Utc>,
    pub search_mode: SearchMode,
}

/// Per-service feedback aggregate over a time window
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedbackAggregate {
    /// Feedback rows inside the window
    pub impressions: u64,
    /// Click-through rows inside the window
    pub clicks: u64,
    /// Most recent interaction, any window
    pub last_interaction: Option<DateTime<Utc>>,
    /// Interaction count, any window
    pub total_interactions: u64,
}

/// A recurring invocation pattern mined from feedback records
#[derive(Debug, Clone)]
pub struct WorkflowPattern {
    pub initiator_id: i32,
    pub target_id: i32,
    pub tool_id: i32,
    pub invocation_count: u64,
}
