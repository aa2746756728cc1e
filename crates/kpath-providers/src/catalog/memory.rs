//! In-memory catalog provider
//!
//! Backs all three catalog ports with concurrent maps. Nothing persists;
//! intended for tests, development, and offline evaluation. Behavior
//! mirrors the Postgres provider, including ordering and active-only
//! filters, so the two are interchangeable under the test suite.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use kpath_domain::entities::{
    ApiKeyRecord, Capability, FeedbackEvent, NewFeedbackEvent, RequestLogEntry, SearchLogEntry,
    Service, Tool, UserRecord,
};
use kpath_domain::error::{Error, Result};
use kpath_domain::ports::{
    AuthStore, CatalogReader, FeedbackStore, PopularQuery, ServiceFeedbackStats,
};
use kpath_domain::value_objects::{FeedbackAggregate, WorkflowPattern};

/// One recorded cross-service invocation, feeding workflow patterns
#[derive(Debug, Clone)]
struct InvocationRecord {
    initiator_id: i32,
    target_id: i32,
    tool_id: i32,
    success: bool,
}

struct TimedRequest {
    entry: RequestLogEntry,
    timestamp: DateTime<Utc>,
}

/// In-memory catalog, feedback, and auth store
#[derive(Default)]
pub struct InMemoryCatalog {
    services: DashMap<i32, Service>,
    tools: DashMap<i32, Tool>,
    users: DashMap<i32, UserRecord>,
    api_keys: DashMap<String, ApiKeyRecord>,
    feedback: RwLock<Vec<FeedbackEvent>>,
    invocations: RwLock<Vec<InvocationRecord>>,
    request_log: RwLock<Vec<TimedRequest>>,
    search_log: RwLock<Vec<SearchLogEntry>>,
    next_feedback_id: AtomicI64,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a service
    pub fn insert_service(&self, service: Service) {
        self.services.insert(service.id, service);
    }

    /// Remove a service and its tools, mirroring the cascade delete
    pub fn delete_service(&self, service_id: i32) {
        self.services.remove(&service_id);
        self.tools.retain(|_, tool| tool.service_id != service_id);
    }

    /// Insert or replace a tool; the parent service name is denormalized
    /// from the current services map
    pub fn insert_tool(&self, mut tool: Tool) {
        if let Some(service) = self.services.get(&tool.service_id) {
            tool.service_name = service.name.clone();
        }
        self.tools.insert(tool.id, tool);
    }

    pub fn insert_user(&self, user: UserRecord) {
        self.users.insert(user.id, user);
    }

    /// Store an API key record under the hash of the given plaintext
    pub fn insert_api_key(&self, plaintext: &str, mut record: ApiKeyRecord) {
        record.key_hash = ApiKeyRecord::hash_key(plaintext);
        self.api_keys.insert(record.key_hash.clone(), record);
    }

    /// Record one cross-service invocation for workflow mining
    pub fn record_invocation(&self, initiator_id: i32, target_id: i32, tool_id: i32, success: bool) {
        self.invocations
            .write()
            .expect("invocation log lock poisoned")
            .push(InvocationRecord {
                initiator_id,
                target_id,
                tool_id,
                success,
            });
    }

    /// Number of stored feedback events (test observability)
    pub fn feedback_count(&self) -> usize {
        self.feedback.read().expect("feedback lock poisoned").len()
    }

    /// Append a request-log row with an explicit timestamp
    ///
    /// Lets tests age the rate window without sleeping.
    pub fn log_request_at(&self, entry: RequestLogEntry, timestamp: DateTime<Utc>) {
        self.request_log
            .write()
            .expect("request log lock poisoned")
            .push(TimedRequest { entry, timestamp });
    }
}

#[async_trait]
impl CatalogReader for InMemoryCatalog {
    async fn active_services(&self) -> Result<Vec<Service>> {
        let mut services: Vec<Service> = self
            .services
            .iter()
            .filter(|entry| entry.status.is_active())
            .map(|entry| entry.clone())
            .collect();
        services.sort_by_key(|s| s.id);
        Ok(services)
    }

    async fn active_tools(&self) -> Result<Vec<Tool>> {
        let active_service_ids: HashSet<i32> = self
            .services
            .iter()
            .filter(|entry| entry.status.is_active())
            .map(|entry| entry.id)
            .collect();

        let mut tools: Vec<Tool> = self
            .tools
            .iter()
            .filter(|entry| entry.is_active && active_service_ids.contains(&entry.service_id))
            .map(|entry| entry.clone())
            .collect();
        tools.sort_by_key(|t| t.id);
        Ok(tools)
    }

    async fn service_by_id(&self, id: i32) -> Result<Option<Service>> {
        Ok(self.services.get(&id).map(|entry| entry.clone()))
    }

    async fn services_by_ids(&self, ids: &[i32]) -> Result<Vec<Service>> {
        let mut services: Vec<Service> = ids
            .iter()
            .filter_map(|id| self.services.get(id).map(|entry| entry.clone()))
            .collect();
        services.sort_by_key(|s| s.id);
        services.dedup_by_key(|s| s.id);
        Ok(services)
    }

    async fn tool_by_id(&self, id: i32) -> Result<Option<Tool>> {
        Ok(self.tools.get(&id).map(|entry| entry.clone()))
    }

    async fn tools_by_service(&self, service_ids: &[i32]) -> Result<HashMap<i32, Vec<Tool>>> {
        let wanted: HashSet<i32> = service_ids.iter().copied().collect();
        let mut by_service: HashMap<i32, Vec<Tool>> = HashMap::new();
        for entry in self.tools.iter() {
            if wanted.contains(&entry.service_id) {
                by_service
                    .entry(entry.service_id)
                    .or_default()
                    .push(entry.clone());
            }
        }
        for tools in by_service.values_mut() {
            tools.sort_by_key(|t| t.id);
        }
        Ok(by_service)
    }

    async fn active_capabilities(&self) -> Result<Vec<Capability>> {
        let mut capabilities: Vec<Capability> = self
            .services
            .iter()
            .filter(|entry| entry.status.is_active())
            .flat_map(|entry| entry.capabilities.clone())
            .collect();
        capabilities.sort_by_key(|c| c.id);
        Ok(capabilities)
    }
}

#[async_trait]
impl FeedbackStore for InMemoryCatalog {
    async fn record_feedback(&self, event: NewFeedbackEvent) -> Result<i64> {
        let id = self.next_feedback_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.feedback
            .write()
            .expect("feedback lock poisoned")
            .push(FeedbackEvent {
                id,
                query: event.query,
                query_hash: event.query_hash,
                service_id: event.service_id,
                user_id: event.user_id,
                rank: event.rank,
                click_through: event.click_through,
                user_satisfaction: event.user_satisfaction,
                timestamp: Utc::now(),
            });
        Ok(id)
    }

    async fn feedback_aggregates(
        &self,
        service_ids: &[i32],
        window: Duration,
    ) -> Result<HashMap<i32, FeedbackAggregate>> {
        let wanted: HashSet<i32> = service_ids.iter().copied().collect();
        let cutoff = Utc::now() - window;

        let mut aggregates: HashMap<i32, FeedbackAggregate> = HashMap::new();
        for event in self.feedback.read().expect("feedback lock poisoned").iter() {
            if !wanted.contains(&event.service_id) {
                continue;
            }
            let aggregate = aggregates.entry(event.service_id).or_default();
            aggregate.total_interactions += 1;
            aggregate.last_interaction = Some(
                aggregate
                    .last_interaction
                    .map_or(event.timestamp, |last| last.max(event.timestamp)),
            );
            if event.timestamp >= cutoff {
                aggregate.impressions += 1;
                if event.click_through {
                    aggregate.clicks += 1;
                }
            }
        }
        Ok(aggregates)
    }

    async fn query_hash_matches(
        &self,
        query_hash: &str,
        service_ids: &[i32],
    ) -> Result<HashMap<i32, u64>> {
        let wanted: HashSet<i32> = service_ids.iter().copied().collect();
        let mut counts: HashMap<i32, u64> = HashMap::new();
        for event in self.feedback.read().expect("feedback lock poisoned").iter() {
            if event.click_through
                && event.query_hash == query_hash
                && wanted.contains(&event.service_id)
            {
                *counts.entry(event.service_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn workflow_patterns(&self, min_invocations: u64) -> Result<Vec<WorkflowPattern>> {
        let mut counts: HashMap<(i32, i32, i32), u64> = HashMap::new();
        for record in self
            .invocations
            .read()
            .expect("invocation log lock poisoned")
            .iter()
            .filter(|r| r.success)
        {
            *counts
                .entry((record.initiator_id, record.target_id, record.tool_id))
                .or_insert(0) += 1;
        }

        let mut patterns: Vec<WorkflowPattern> = counts
            .into_iter()
            .filter(|(_, count)| *count >= min_invocations)
            .map(|((initiator_id, target_id, tool_id), invocation_count)| WorkflowPattern {
                initiator_id,
                target_id,
                tool_id,
                invocation_count,
            })
            .collect();
        patterns.sort_by(|a, b| b.invocation_count.cmp(&a.invocation_count));
        Ok(patterns)
    }

    async fn feedback_stats(
        &self,
        service_id: Option<i32>,
        limit: usize,
    ) -> Result<Vec<ServiceFeedbackStats>> {
        let mut grouped: HashMap<i32, (u64, u64, HashSet<i32>)> = HashMap::new();
        for event in self.feedback.read().expect("feedback lock poisoned").iter() {
            if service_id.is_some_and(|id| id != event.service_id) {
                continue;
            }
            let entry = grouped.entry(event.service_id).or_default();
            entry.0 += 1;
            entry.1 += event.rank.max(0) as u64;
            entry.2.insert(event.user_id);
        }

        let mut stats: Vec<ServiceFeedbackStats> = grouped
            .into_iter()
            .map(|(service_id, (clicks, rank_sum, users))| ServiceFeedbackStats {
                service_id,
                service_name: self
                    .services
                    .get(&service_id)
                    .map(|s| s.name.clone())
                    .unwrap_or_default(),
                total_clicks: clicks,
                average_rank: (clicks > 0).then(|| rank_sum as f64 / clicks as f64),
                unique_users: users.len() as u64,
            })
            .collect();
        stats.sort_by(|a, b| b.total_clicks.cmp(&a.total_clicks));
        stats.truncate(limit);
        Ok(stats)
    }

    async fn popular_queries(&self, limit: usize) -> Result<Vec<PopularQuery>> {
        let mut grouped: HashMap<String, (u64, HashSet<i32>)> = HashMap::new();
        for event in self.feedback.read().expect("feedback lock poisoned").iter() {
            let entry = grouped.entry(event.query.clone()).or_default();
            entry.0 += 1;
            entry.1.insert(event.user_id);
        }

        let mut queries: Vec<PopularQuery> = grouped
            .into_iter()
            .map(|(query, (count, users))| PopularQuery {
                query,
                search_count: count,
                unique_users: users.len() as u64,
            })
            .collect();
        queries.sort_by(|a, b| b.search_count.cmp(&a.search_count));
        queries.truncate(limit);
        Ok(queries)
    }
}

#[async_trait]
impl AuthStore for InMemoryCatalog {
    async fn api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>> {
        Ok(self.api_keys.get(key_hash).map(|entry| entry.clone()))
    }

    async fn touch_api_key(&self, key_id: i32) -> Result<()> {
        for mut entry in self.api_keys.iter_mut() {
            if entry.id == key_id {
                entry.last_used = Some(Utc::now());
                return Ok(());
            }
        }
        Err(Error::not_found(format!("API key {}", key_id)))
    }

    async fn user_by_id(&self, id: i32) -> Result<Option<UserRecord>> {
        Ok(self.users.get(&id).map(|entry| entry.clone()))
    }

    async fn count_requests_since(
        &self,
        api_key_id: i32,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        Ok(self
            .request_log
            .read()
            .expect("request log lock poisoned")
            .iter()
            .filter(|r| r.entry.api_key_id == Some(api_key_id) && r.timestamp >= since)
            .count() as u64)
    }

    async fn log_request(&self, entry: RequestLogEntry) -> Result<()> {
        self.request_log
            .write()
            .expect("request log lock poisoned")
            .push(TimedRequest {
                entry,
                timestamp: Utc::now(),
            });
        Ok(())
    }

    async fn log_search(&self, entry: SearchLogEntry) -> Result<()> {
        self.search_log
            .write()
            .expect("search log lock poisoned")
            .push(entry);
        Ok(())
    }
}
