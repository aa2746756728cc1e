//! Service registry entities
//!
//! A `Service` is a discoverable capability provider. The catalog reader
//! returns services with their capabilities, domain tags, and connectivity
//! contracts eagerly loaded, so the search path never goes back to the
//! store for per-service detail.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a service
///
/// Only `Active` services participate in search. `Deprecated` services stay
/// resolvable by id for hydration of historical feedback but are excluded
/// from every index build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Active,
    Inactive,
    Deprecated,
}

impl ServiceStatus {
    /// Whether the service may appear in search results
    pub fn is_active(self) -> bool {
        matches!(self, ServiceStatus::Active)
    }
}

/// A short described ability of a service
///
/// Used both as searchable text (the description is folded into the
/// service embedding) and as a post-filter key (substring match on the
/// description).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub id: i32,
    pub service_id: i32,
    /// Optional short name, e.g. "SendEmail"
    pub name: Option<String>,
    /// Free-text description of what the service can do
    pub description: String,
    pub input_schema: Option<Value>,
    pub output_schema: Option<Value>,
}

/// Per-service connectivity contract
///
/// Read-only to the search core; returned verbatim in hydrated responses so
/// an orchestrator can invoke the service without a second lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrationDetails {
    pub access_protocol: Option<String>,
    pub base_endpoint: Option<String>,
    pub auth_method: Option<String>,
    pub auth_config: Option<Value>,
    pub auth_endpoint: Option<String>,
    pub rate_limit_requests: Option<i32>,
    pub rate_limit_window_seconds: Option<i32>,
    pub max_concurrent_requests: Option<i32>,
    pub circuit_breaker_config: Option<Value>,
    pub default_headers: Option<Value>,
    pub request_content_type: Option<String>,
    pub response_content_type: Option<String>,
    pub health_check_endpoint: Option<String>,
    pub health_check_interval_seconds: Option<i32>,
}

/// Per-service agent-facing contract
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentProtocol {
    pub message_protocol: Option<String>,
    pub protocol_version: Option<String>,
    pub expected_input_format: Option<String>,
    pub response_style: Option<String>,
    pub message_examples: Option<Value>,
    pub tool_schema: Option<Value>,
    pub requires_session_state: Option<bool>,
    pub max_context_length: Option<i32>,
    pub supports_streaming: Option<bool>,
    pub supports_async: Option<bool>,
    pub supports_batch: Option<bool>,
}

/// A discoverable capability provider
///
/// ## Business Rules
///
/// - `name` is unique across the catalog
/// - only services with `status == Active` appear in search results
/// - deleting a service cascades to capabilities, domains, integration
///   details, the agent protocol record, and tools (enforced by the store)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub endpoint: Option<String>,
    pub version: Option<String>,
    pub status: ServiceStatus,
    pub tool_type: Option<String>,
    pub visibility: Option<String>,
    pub interaction_modes: Vec<String>,
    pub default_timeout_ms: Option<i64>,
    pub default_retry_policy: Option<Value>,
    pub success_criteria: Option<Value>,
    pub capabilities: Vec<Capability>,
    /// Industry/domain tags, e.g. "Finance"
    pub domains: Vec<String>,
    pub tags: Vec<String>,
    pub integration_details: Option<IntegrationDetails>,
    pub agent_protocol: Option<AgentProtocol>,
    /// Opaque orchestration metadata surfaced only when a caller asks for
    /// orchestration detail; never used for embedding or filtering.
    pub orchestration: Option<Value>,
}

impl Service {
    /// Lowercased domain tags, used by the case-insensitive domain filter
    pub fn domains_lowercase(&self) -> Vec<String> {
        self.domains.iter().map(|d| d.to_lowercase()).collect()
    }

    /// Capability descriptions, in catalog order
    pub fn capability_descriptions(&self) -> Vec<&str> {
        self.capabilities
            .iter()
            .map(|c| c.description.as_str())
            .collect()
    }
}
