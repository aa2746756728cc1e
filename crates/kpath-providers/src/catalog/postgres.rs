//! Postgres catalog provider
//!
//! Production implementation of the catalog ports over an r2d2 connection
//! pool. Connections are checked out inside `spawn_blocking` so pool waits
//! and query time never stall the async workers; each port call is one
//! short transaction-free session.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use r2d2::Pool;
use r2d2_postgres::postgres::NoTls;
use r2d2_postgres::PostgresConnectionManager;
use std::collections::HashMap;

use kpath_domain::entities::{
    AgentProtocol, ApiKeyRecord, Capability, IntegrationDetails, NewFeedbackEvent,
    RequestLogEntry, SearchLogEntry, Service, ServiceStatus, Tool, UserRecord,
};
use kpath_domain::error::{Error, Result};
use kpath_domain::ports::{
    AuthStore, CatalogReader, FeedbackStore, PopularQuery, ServiceFeedbackStats,
};
use kpath_domain::value_objects::{FeedbackAggregate, WorkflowPattern};

type PgPool = Pool<PostgresConnectionManager<NoTls>>;
type PgConn = r2d2::PooledConnection<PostgresConnectionManager<NoTls>>;

/// Catalog store backed by Postgres
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    /// Connect a pool against the given connection string
    pub fn connect(database_url: &str, pool_size: u32) -> Result<Self> {
        let config: r2d2_postgres::postgres::Config = database_url
            .parse()
            .map_err(|e| Error::configuration_with_source("Invalid database URL", e))?;
        let manager = PostgresConnectionManager::new(config, NoTls);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e| Error::database_with_source("Failed to build connection pool", e))?;
        Ok(Self { pool })
    }

    /// Run a closure on a pooled connection inside the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConn) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| Error::database_with_source("Failed to acquire connection", e))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| Error::internal(format!("Database task failed: {}", e)))?
    }
}

fn db_err(context: &str, e: r2d2_postgres::postgres::Error) -> Error {
    Error::database_with_source(context.to_string(), e)
}

fn parse_status(raw: &str) -> ServiceStatus {
    match raw {
        "inactive" => ServiceStatus::Inactive,
        "deprecated" => ServiceStatus::Deprecated,
        _ => ServiceStatus::Active,
    }
}

/// Load services by an id filter (None = all active) with eager detail
fn load_services(conn: &mut PgConn, ids: Option<&[i32]>) -> Result<Vec<Service>> {
    let rows = match ids {
        Some(ids) => conn
            .query(
                "SELECT id, name, description, endpoint, version, status, tool_type, \
                        visibility, interaction_modes, default_timeout_ms, \
                        default_retry_policy, success_criteria, tags, orchestration \
                 FROM services WHERE id = ANY($1) ORDER BY id",
                &[&ids],
            )
            .map_err(|e| db_err("Failed to load services", e))?,
        None => conn
            .query(
                "SELECT id, name, description, endpoint, version, status, tool_type, \
                        visibility, interaction_modes, default_timeout_ms, \
                        default_retry_policy, success_criteria, tags, orchestration \
                 FROM services WHERE status = 'active' ORDER BY id",
                &[],
            )
            .map_err(|e| db_err("Failed to load services", e))?,
    };

    let mut services: Vec<Service> = rows
        .iter()
        .map(|row| Service {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            endpoint: row.get("endpoint"),
            version: row.get("version"),
            status: parse_status(row.get("status")),
            tool_type: row.get("tool_type"),
            visibility: row.get("visibility"),
            interaction_modes: row
                .get::<_, Option<Vec<String>>>("interaction_modes")
                .unwrap_or_default(),
            default_timeout_ms: row.get("default_timeout_ms"),
            default_retry_policy: row.get("default_retry_policy"),
            success_criteria: row.get("success_criteria"),
            capabilities: Vec::new(),
            domains: Vec::new(),
            tags: row.get::<_, Option<Vec<String>>>("tags").unwrap_or_default(),
            integration_details: None,
            agent_protocol: None,
            orchestration: row.get("orchestration"),
        })
        .collect();

    if services.is_empty() {
        return Ok(services);
    }
    let service_ids: Vec<i32> = services.iter().map(|s| s.id).collect();
    let by_id: HashMap<i32, usize> = services
        .iter()
        .enumerate()
        .map(|(index, s)| (s.id, index))
        .collect();

    for row in conn
        .query(
            "SELECT id, service_id, capability_name, capability_desc, input_schema, \
                    output_schema \
             FROM service_capability WHERE service_id = ANY($1) ORDER BY id",
            &[&service_ids],
        )
        .map_err(|e| db_err("Failed to load capabilities", e))?
    {
        let service_id: i32 = row.get("service_id");
        if let Some(&index) = by_id.get(&service_id) {
            services[index].capabilities.push(Capability {
                id: row.get("id"),
                service_id,
                name: row.get("capability_name"),
                description: row.get("capability_desc"),
                input_schema: row.get("input_schema"),
                output_schema: row.get("output_schema"),
            });
        }
    }

    for row in conn
        .query(
            "SELECT service_id, domain FROM service_industry \
             WHERE service_id = ANY($1) ORDER BY id",
            &[&service_ids],
        )
        .map_err(|e| db_err("Failed to load domains", e))?
    {
        let service_id: i32 = row.get("service_id");
        if let Some(&index) = by_id.get(&service_id) {
            services[index].domains.push(row.get("domain"));
        }
    }

    for row in conn
        .query(
            "SELECT service_id, access_protocol, base_endpoint, auth_method, auth_config, \
                    auth_endpoint, rate_limit_requests, rate_limit_window_seconds, \
                    max_concurrent_requests, circuit_breaker_config, default_headers, \
                    request_content_type, response_content_type, health_check_endpoint, \
                    health_check_interval_seconds \
             FROM service_integration_details WHERE service_id = ANY($1)",
            &[&service_ids],
        )
        .map_err(|e| db_err("Failed to load integration details", e))?
    {
        let service_id: i32 = row.get("service_id");
        if let Some(&index) = by_id.get(&service_id) {
            services[index].integration_details = Some(IntegrationDetails {
                access_protocol: row.get("access_protocol"),
                base_endpoint: row.get("base_endpoint"),
                auth_method: row.get("auth_method"),
                auth_config: row.get("auth_config"),
                auth_endpoint: row.get("auth_endpoint"),
                rate_limit_requests: row.get("rate_limit_requests"),
                rate_limit_window_seconds: row.get("rate_limit_window_seconds"),
                max_concurrent_requests: row.get("max_concurrent_requests"),
                circuit_breaker_config: row.get("circuit_breaker_config"),
                default_headers: row.get("default_headers"),
                request_content_type: row.get("request_content_type"),
                response_content_type: row.get("response_content_type"),
                health_check_endpoint: row.get("health_check_endpoint"),
                health_check_interval_seconds: row.get("health_check_interval_seconds"),
            });
        }
    }

    for row in conn
        .query(
            "SELECT service_id, message_protocol, protocol_version, expected_input_format, \
                    response_style, message_examples, tool_schema, requires_session_state, \
                    max_context_length, supports_streaming, supports_async, supports_batch \
             FROM service_agent_protocols WHERE service_id = ANY($1)",
            &[&service_ids],
        )
        .map_err(|e| db_err("Failed to load agent protocols", e))?
    {
        let service_id: i32 = row.get("service_id");
        if let Some(&index) = by_id.get(&service_id) {
            services[index].agent_protocol = Some(AgentProtocol {
                message_protocol: row.get("message_protocol"),
                protocol_version: row.get("protocol_version"),
                expected_input_format: row.get("expected_input_format"),
                response_style: row.get("response_style"),
                message_examples: row.get("message_examples"),
                tool_schema: row.get("tool_schema"),
                requires_session_state: row.get("requires_session_state"),
                max_context_length: row.get("max_context_length"),
                supports_streaming: row.get("supports_streaming"),
                supports_async: row.get("supports_async"),
                supports_batch: row.get("supports_batch"),
            });
        }
    }

    Ok(services)
}

fn map_tool(row: &r2d2_postgres::postgres::Row) -> Tool {
    Tool {
        id: row.get("id"),
        service_id: row.get("service_id"),
        service_name: row.get("service_name"),
        tool_name: row.get("tool_name"),
        description: row.get("tool_description"),
        input_schema: row.get("input_schema"),
        output_schema: row.get("output_schema"),
        example_calls: row.get("example_calls"),
        validation_rules: row.get("validation_rules"),
        version: row.get("tool_version"),
        is_active: row.get("is_active"),
        deprecation_date: row.get("deprecation_date"),
        deprecation_notice: row.get("deprecation_notice"),
    }
}

const TOOL_COLUMNS: &str = "t.id, t.service_id, s.name AS service_name, t.tool_name, \
     t.tool_description, t.input_schema, t.output_schema, t.example_calls, \
     t.validation_rules, t.tool_version, t.is_active, t.deprecation_date, \
     t.deprecation_notice";

#[async_trait]
impl CatalogReader for PostgresCatalog {
    async fn active_services(&self) -> Result<Vec<Service>> {
        self.with_conn(|conn| load_services(conn, None)).await
    }

    async fn active_tools(&self) -> Result<Vec<Tool>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {TOOL_COLUMNS} FROM tools t \
                 JOIN services s ON s.id = t.service_id \
                 WHERE t.is_active AND s.status = 'active' ORDER BY t.id"
            );
            let rows = conn
                .query(sql.as_str(), &[])
                .map_err(|e| db_err("Failed to load tools", e))?;
            Ok(rows.iter().map(map_tool).collect())
        })
        .await
    }

    async fn service_by_id(&self, id: i32) -> Result<Option<Service>> {
        self.with_conn(move |conn| {
            Ok(load_services(conn, Some(&[id]))?.into_iter().next())
        })
        .await
    }

    async fn services_by_ids(&self, ids: &[i32]) -> Result<Vec<Service>> {
        let ids = ids.to_vec();
        self.with_conn(move |conn| load_services(conn, Some(&ids))).await
    }

    async fn tool_by_id(&self, id: i32) -> Result<Option<Tool>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {TOOL_COLUMNS} FROM tools t \
                 JOIN services s ON s.id = t.service_id WHERE t.id = $1"
            );
            let rows = conn
                .query(sql.as_str(), &[&id])
                .map_err(|e| db_err("Failed to load tool", e))?;
            Ok(rows.first().map(map_tool))
        })
        .await
    }

    async fn tools_by_service(&self, service_ids: &[i32]) -> Result<HashMap<i32, Vec<Tool>>> {
        let service_ids = service_ids.to_vec();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {TOOL_COLUMNS} FROM tools t \
                 JOIN services s ON s.id = t.service_id \
                 WHERE t.service_id = ANY($1) ORDER BY t.id"
            );
            let rows = conn
                .query(sql.as_str(), &[&service_ids])
                .map_err(|e| db_err("Failed to load service tools", e))?;

            let mut by_service: HashMap<i32, Vec<Tool>> = HashMap::new();
            for row in &rows {
                let tool = map_tool(row);
                by_service.entry(tool.service_id).or_default().push(tool);
            }
            Ok(by_service)
        })
        .await
    }

    async fn active_capabilities(&self) -> Result<Vec<Capability>> {
        self.with_conn(|conn| {
            let rows = conn
                .query(
                    "SELECT c.id, c.service_id, c.capability_name, c.capability_desc, \
                            c.input_schema, c.output_schema \
                     FROM service_capability c \
                     JOIN services s ON s.id = c.service_id \
                     WHERE s.status = 'active' ORDER BY c.id",
                    &[],
                )
                .map_err(|e| db_err("Failed to load capabilities", e))?;
            Ok(rows
                .iter()
                .map(|row| Capability {
                    id: row.get("id"),
                    service_id: row.get("service_id"),
                    name: row.get("capability_name"),
                    description: row.get("capability_desc"),
                    input_schema: row.get("input_schema"),
                    output_schema: row.get("output_schema"),
                })
                .collect())
        })
        .await
    }
}

#[async_trait]
impl FeedbackStore for PostgresCatalog {
    async fn record_feedback(&self, event: NewFeedbackEvent) -> Result<i64> {
        self.with_conn(move |conn| {
            let row = conn
                .query_one(
                    "INSERT INTO feedback_log \
                     (query, query_embedding_hash, selected_service_id, user_id, \
                      rank_position, click_through, user_satisfaction) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
                    &[
                        &event.query,
                        &event.query_hash,
                        &event.service_id,
                        &event.user_id,
                        &event.rank,
                        &event.click_through,
                        &event.user_satisfaction,
                    ],
                )
                .map_err(|e| db_err("Failed to record feedback", e))?;
            Ok(row.get::<_, i64>("id"))
        })
        .await
    }

    async fn feedback_aggregates(
        &self,
        service_ids: &[i32],
        window: Duration,
    ) -> Result<HashMap<i32, FeedbackAggregate>> {
        let service_ids = service_ids.to_vec();
        let cutoff = Utc::now() - window;
        self.with_conn(move |conn| {
            let mut aggregates: HashMap<i32, FeedbackAggregate> = HashMap::new();

            for row in conn
                .query(
                    "SELECT selected_service_id, COUNT(*) AS total, MAX(timestamp) AS latest \
                     FROM feedback_log WHERE selected_service_id = ANY($1) \
                     GROUP BY selected_service_id",
                    &[&service_ids],
                )
                .map_err(|e| db_err("Failed to aggregate feedback", e))?
            {
                let entry = aggregates
                    .entry(row.get("selected_service_id"))
                    .or_default();
                entry.total_interactions = row.get::<_, i64>("total") as u64;
                entry.last_interaction = row.get::<_, Option<DateTime<Utc>>>("latest");
            }

            for row in conn
                .query(
                    "SELECT selected_service_id, COUNT(*) AS impressions, \
                            COUNT(*) FILTER (WHERE click_through) AS clicks \
                     FROM feedback_log \
                     WHERE selected_service_id = ANY($1) AND timestamp >= $2 \
                     GROUP BY selected_service_id",
                    &[&service_ids, &cutoff],
                )
                .map_err(|e| db_err("Failed to aggregate windowed feedback", e))?
            {
                let entry = aggregates
                    .entry(row.get("selected_service_id"))
                    .or_default();
                entry.impressions = row.get::<_, i64>("impressions") as u64;
                entry.clicks = row.get::<_, i64>("clicks") as u64;
            }

            Ok(aggregates)
        })
        .await
    }

    async fn query_hash_matches(
        &self,
        query_hash: &str,
        service_ids: &[i32],
    ) -> Result<HashMap<i32, u64>> {
        let query_hash = query_hash.to_string();
        let service_ids = service_ids.to_vec();
        self.with_conn(move |conn| {
            let rows = conn
                .query(
                    "SELECT selected_service_id, COUNT(*) AS selections \
                     FROM feedback_log \
                     WHERE query_embedding_hash = $1 AND click_through \
                       AND selected_service_id = ANY($2) \
                     GROUP BY selected_service_id",
                    &[&query_hash, &service_ids],
                )
                .map_err(|e| db_err("Failed to count query matches", e))?;
            Ok(rows
                .iter()
                .map(|row| {
                    (
                        row.get::<_, i32>("selected_service_id"),
                        row.get::<_, i64>("selections") as u64,
                    )
                })
                .collect())
        })
        .await
    }

    async fn workflow_patterns(&self, min_invocations: u64) -> Result<Vec<WorkflowPattern>> {
        let min = min_invocations as i64;
        self.with_conn(move |conn| {
            let rows = conn
                .query(
                    "SELECT initiator_agent_id, target_agent_id, tool_id, \
                            COUNT(*) AS invocation_count \
                     FROM invocation_logs WHERE success \
                     GROUP BY initiator_agent_id, target_agent_id, tool_id \
                     HAVING COUNT(*) >= $1 \
                     ORDER BY COUNT(*) DESC",
                    &[&min],
                )
                .map_err(|e| db_err("Failed to load invocation patterns", e))?;
            Ok(rows
                .iter()
                .map(|row| WorkflowPattern {
                    initiator_id: row.get("initiator_agent_id"),
                    target_id: row.get("target_agent_id"),
                    tool_id: row.get("tool_id"),
                    invocation_count: row.get::<_, i64>("invocation_count") as u64,
                })
                .collect())
        })
        .await
    }

    async fn feedback_stats(
        &self,
        service_id: Option<i32>,
        limit: usize,
    ) -> Result<Vec<ServiceFeedbackStats>> {
        let limit = limit as i64;
        self.with_conn(move |conn| {
            let rows = match service_id {
                Some(service_id) => conn
                    .query(
                        "SELECT f.selected_service_id, s.name, COUNT(f.id) AS total_clicks, \
                                AVG(f.rank_position) AS average_rank, \
                                COUNT(DISTINCT f.user_id) AS unique_users \
                         FROM feedback_log f \
                         JOIN services s ON s.id = f.selected_service_id \
                         WHERE f.selected_service_id = $1 \
                         GROUP BY f.selected_service_id, s.name \
                         ORDER BY COUNT(f.id) DESC LIMIT $2",
                        &[&service_id, &limit],
                    )
                    .map_err(|e| db_err("Failed to load feedback stats", e))?,
                None => conn
                    .query(
                        "SELECT f.selected_service_id, s.name, COUNT(f.id) AS total_clicks, \
                                AVG(f.rank_position) AS average_rank, \
                                COUNT(DISTINCT f.user_id) AS unique_users \
                         FROM feedback_log f \
                         JOIN services s ON s.id = f.selected_service_id \
                         GROUP BY f.selected_service_id, s.name \
                         ORDER BY COUNT(f.id) DESC LIMIT $1",
                        &[&limit],
                    )
                    .map_err(|e| db_err("Failed to load feedback stats", e))?,
            };
            Ok(rows
                .iter()
                .map(|row| ServiceFeedbackStats {
                    service_id: row.get("selected_service_id"),
                    service_name: row.get("name"),
                    total_clicks: row.get::<_, i64>("total_clicks") as u64,
                    average_rank: row.get("average_rank"),
                    unique_users: row.get::<_, i64>("unique_users") as u64,
                })
                .collect())
        })
        .await
    }

    async fn popular_queries(&self, limit: usize) -> Result<Vec<PopularQuery>> {
        let limit = limit as i64;
        self.with_conn(move |conn| {
            let rows = conn
                .query(
                    "SELECT query, COUNT(id) AS search_count, \
                            COUNT(DISTINCT user_id) AS unique_users \
                     FROM feedback_log GROUP BY query \
                     ORDER BY COUNT(id) DESC LIMIT $1",
                    &[&limit],
                )
                .map_err(|e| db_err("Failed to load popular queries", e))?;
            Ok(rows
                .iter()
                .map(|row| PopularQuery {
                    query: row.get("query"),
                    search_count: row.get::<_, i64>("search_count") as u64,
                    unique_users: row.get::<_, i64>("unique_users") as u64,
                })
                .collect())
        })
        .await
    }
}

#[async_trait]
impl AuthStore for PostgresCatalog {
    async fn api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>> {
        let key_hash = key_hash.to_string();
        self.with_conn(move |conn| {
            let rows = conn
                .query(
                    "SELECT id, user_id, name, key_hash, scopes, active, expires_at, \
                            last_used, rate_limit \
                     FROM api_keys WHERE key_hash = $1",
                    &[&key_hash],
                )
                .map_err(|e| db_err("Failed to look up API key", e))?;
            Ok(rows.first().map(|row| ApiKeyRecord {
                id: row.get("id"),
                user_id: row.get("user_id"),
                name: row.get("name"),
                key_hash: row.get("key_hash"),
                scopes: row
                    .get::<_, Option<Vec<String>>>("scopes")
                    .unwrap_or_default(),
                active: row.get("active"),
                expires_at: row.get("expires_at"),
                last_used: row.get("last_used"),
                rate_limit: row.get::<_, Option<i32>>("rate_limit").map(|v| v.max(0) as u32),
            }))
        })
        .await
    }

    async fn touch_api_key(&self, key_id: i32) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE api_keys SET last_used = NOW() WHERE id = $1",
                &[&key_id],
            )
            .map_err(|e| db_err("Failed to touch API key", e))?;
            Ok(())
        })
        .await
    }

    async fn user_by_id(&self, id: i32) -> Result<Option<UserRecord>> {
        self.with_conn(move |conn| {
            let rows = conn
                .query(
                    "SELECT id, email, role, is_active FROM users WHERE id = $1",
                    &[&id],
                )
                .map_err(|e| db_err("Failed to load user", e))?;
            Ok(rows.first().map(|row| UserRecord {
                id: row.get("id"),
                email: row.get("email"),
                role: row.get::<_, Option<String>>("role").unwrap_or_default(),
                is_active: row.get::<_, Option<bool>>("is_active").unwrap_or(true),
            }))
        })
        .await
    }

    async fn count_requests_since(
        &self,
        api_key_id: i32,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        self.with_conn(move |conn| {
            let row = conn
                .query_one(
                    "SELECT COUNT(*) AS requests FROM api_request_logs \
                     WHERE api_key_id = $1 AND created_at >= $2",
                    &[&api_key_id, &since],
                )
                .map_err(|e| db_err("Failed to count requests", e))?;
            Ok(row.get::<_, i64>("requests") as u64)
        })
        .await
    }

    async fn log_request(&self, entry: RequestLogEntry) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO api_request_logs \
                 (api_key_id, user_id, endpoint, method, status_code, response_time_ms) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &entry.api_key_id,
                    &entry.user_id,
                    &entry.endpoint,
                    &entry.method,
                    &(entry.status_code as i32),
                    &entry.response_time_ms,
                ],
            )
            .map_err(|e| db_err("Failed to log request", e))?;
            Ok(())
        })
        .await
    }

    async fn log_search(&self, entry: SearchLogEntry) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO search_queries (query, user_id, results_count, response_time_ms) \
                 VALUES ($1, $2, $3, $4)",
                &[
                    &entry.query,
                    &entry.user_id,
                    &(entry.results_count as i64),
                    &entry.response_time_ms,
                ],
            )
            .map_err(|e| db_err("Failed to log search", e))?;
            Ok(())
        })
        .await
    }
}
