//! Catalog store ports
//!
//! Read-only projections of the relational catalog plus the append-only
//! feedback and request-log writes. Split into three focused traits so a
//! provider can be wired where only one concern is needed; the shipped
//! providers implement all three on one type.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::entities::{
    ApiKeyRecord, Capability, NewFeedbackEvent, RequestLogEntry, SearchLogEntry, Service, Tool,
    UserRecord,
};
use crate::error::Result;
use crate::value_objects::{FeedbackAggregate, WorkflowPattern};

/// Read access to services, tools, and capabilities
///
/// All reads within one API call observe a consistent snapshot.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Active services ordered by id, with capabilities, domains,
    /// integration details, and agent protocol eagerly loaded
    async fn active_services(&self) -> Result<Vec<Service>>;

    /// Tools whose own flag is active AND whose parent service is active,
    /// ordered by id, with the parent service name denormalized
    async fn active_tools(&self) -> Result<Vec<Tool>>;

    /// A service by id, regardless of status
    async fn service_by_id(&self, id: i32) -> Result<Option<Service>>;

    /// Services for the given ids; missing ids are silently absent
    async fn services_by_ids(&self, ids: &[i32]) -> Result<Vec<Service>>;

    /// A tool by id, regardless of flags
    async fn tool_by_id(&self, id: i32) -> Result<Option<Tool>>;

    /// All tools of the given services, keyed by service id
    async fn tools_by_service(&self, service_ids: &[i32]) -> Result<HashMap<i32, Vec<Tool>>>;

    /// Capability rows of active services, ordered by id
    async fn active_capabilities(&self) -> Result<Vec<Capability>>;
}

/// Per-service feedback statistics for the analytics reads
#[derive(Debug, Clone, Serialize)]
pub struct ServiceFeedbackStats {
    pub service_id: i32,
    pub service_name: String,
    pub total_clicks: u64,
    pub average_rank: Option<f64>,
    pub unique_users: u64,
}

/// A frequently issued query
#[derive(Debug, Clone, Serialize)]
pub struct PopularQuery {
    pub query: String,
    pub search_count: u64,
    pub unique_users: u64,
}

/// Append and aggregate feedback events
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Persist one feedback event, returning its id
    async fn record_feedback(&self, event: NewFeedbackEvent) -> Result<i64>;

    /// Per-service counts: impressions and clicks within `window`,
    /// last interaction and total interactions over all time
    async fn feedback_aggregates(
        &self,
        service_ids: &[i32],
        window: Duration,
    ) -> Result<HashMap<i32, FeedbackAggregate>>;

    /// Per-service count of click-through events recorded for the exact
    /// query hash
    async fn query_hash_matches(
        &self,
        query_hash: &str,
        service_ids: &[i32],
    ) -> Result<HashMap<i32, u64>>;

    /// Invocation patterns with at least `min_invocations` successful
    /// occurrences, for workflow-mode search
    async fn workflow_patterns(&self, min_invocations: u64) -> Result<Vec<WorkflowPattern>>;

    /// Per-service feedback stats, most-clicked first
    async fn feedback_stats(
        &self,
        service_id: Option<i32>,
        limit: usize,
    ) -> Result<Vec<ServiceFeedbackStats>>;

    /// Most frequent queries, descending by count
    async fn popular_queries(&self, limit: usize) -> Result<Vec<PopularQuery>>;
}

/// Credential lookup and request logging
#[async_trait]
pub trait AuthStore: Send + Sync {
    /// API key record for a SHA-256 hex digest; `None` when unknown
    async fn api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>>;

    /// Update the key's last-used timestamp
    async fn touch_api_key(&self, key_id: i32) -> Result<()>;

    /// A user by id
    async fn user_by_id(&self, id: i32) -> Result<Option<UserRecord>>;

    /// Request-log rows for the key since the given instant; drives the
    /// hourly rate window
    async fn count_requests_since(
        &self,
        api_key_id: i32,
        since: DateTime<Utc>,
    ) -> Result<u64>;

    /// Append one request-log row
    async fn log_request(&self, entry: RequestLogEntry) -> Result<()>;

    /// Append one query-log row
    async fn log_search(&self, entry: SearchLogEntry) -> Result<()>;
}
