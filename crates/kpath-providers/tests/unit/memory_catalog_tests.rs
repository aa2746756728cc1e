//! In-memory catalog provider behavior
//!
//! The Postgres provider shares these semantics; the suite pins the parts
//! the search core depends on: active-only projections, denormalized tool
//! parent names, and the append-only feedback/auth stores.

use chrono::Utc;
use serde_json::json;

use kpath_domain::entities::{
    ApiKeyRecord, Capability, NewFeedbackEvent, Service, ServiceStatus, Tool, UserRecord,
};
use kpath_domain::ports::{AuthStore, CatalogReader, FeedbackStore};
use kpath_providers::catalog::InMemoryCatalog;

fn service(id: i32, name: &str, status: ServiceStatus) -> Service {
    Service {
        id,
        name: name.to_string(),
        description: format!("{} description", name),
        endpoint: None,
        version: None,
        status,
        tool_type: None,
        visibility: None,
        interaction_modes: vec![],
        default_timeout_ms: None,
        default_retry_policy: None,
        success_criteria: None,
        capabilities: vec![Capability {
            id,
            service_id: id,
            name: None,
            description: format!("{} capability", name),
            input_schema: None,
            output_schema: None,
        }],
        domains: vec![],
        tags: vec![],
        integration_details: None,
        agent_protocol: None,
        orchestration: None,
    }
}

fn tool(id: i32, service_id: i32, name: &str, active: bool) -> Tool {
    Tool {
        id,
        service_id,
        service_name: String::new(),
        tool_name: name.to_string(),
        description: format!("{} does things", name),
        input_schema: Some(json!({"type": "object", "properties": {"a": {}}})),
        output_schema: None,
        example_calls: None,
        validation_rules: None,
        version: None,
        is_active: active,
        deprecation_date: None,
        deprecation_notice: None,
    }
}

#[tokio::test]
async fn active_services_are_ordered_and_filtered() {
    let catalog = InMemoryCatalog::new();
    catalog.insert_service(service(3, "Gamma", ServiceStatus::Active));
    catalog.insert_service(service(1, "Alpha", ServiceStatus::Active));
    catalog.insert_service(service(2, "Beta", ServiceStatus::Inactive));

    let services = catalog.active_services().await.unwrap();
    let ids: Vec<i32> = services.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![1, 3]);
}

#[tokio::test]
async fn active_tools_require_active_parent_and_flag() {
    let catalog = InMemoryCatalog::new();
    catalog.insert_service(service(1, "Alpha", ServiceStatus::Active));
    catalog.insert_service(service(2, "Beta", ServiceStatus::Inactive));
    catalog.insert_tool(tool(10, 1, "alpha_tool", true));
    catalog.insert_tool(tool(11, 1, "dormant_tool", false));
    catalog.insert_tool(tool(12, 2, "orphan_tool", true));

    let tools = catalog.active_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].id, 10);
    // parent name denormalized at insert
    assert_eq!(tools[0].service_name, "Alpha");
}

#[tokio::test]
async fn delete_service_cascades_to_tools() {
    let catalog = InMemoryCatalog::new();
    catalog.insert_service(service(1, "Alpha", ServiceStatus::Active));
    catalog.insert_tool(tool(10, 1, "alpha_tool", true));

    catalog.delete_service(1);
    assert!(catalog.service_by_id(1).await.unwrap().is_none());
    assert!(catalog.tool_by_id(10).await.unwrap().is_none());
}

#[tokio::test]
async fn services_by_ids_skips_unknown_ids() {
    let catalog = InMemoryCatalog::new();
    catalog.insert_service(service(1, "Alpha", ServiceStatus::Active));

    let services = catalog.services_by_ids(&[1, 99, 1]).await.unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].id, 1);
}

#[tokio::test]
async fn active_capabilities_come_from_active_services_only() {
    let catalog = InMemoryCatalog::new();
    catalog.insert_service(service(1, "Alpha", ServiceStatus::Active));
    catalog.insert_service(service(2, "Beta", ServiceStatus::Deprecated));

    let capabilities = catalog.active_capabilities().await.unwrap();
    assert_eq!(capabilities.len(), 1);
    assert_eq!(capabilities[0].service_id, 1);
}

#[tokio::test]
async fn feedback_ids_are_monotonic() {
    let catalog = InMemoryCatalog::new();
    let event = NewFeedbackEvent {
        query: "q".to_string(),
        query_hash: "h".to_string(),
        service_id: 1,
        user_id: 1,
        rank: 1,
        click_through: true,
        user_satisfaction: None,
    };
    let first = catalog.record_feedback(event.clone()).await.unwrap();
    let second = catalog.record_feedback(event).await.unwrap();
    assert!(second > first);
    assert_eq!(catalog.feedback_count(), 2);
}

#[tokio::test]
async fn workflow_patterns_require_successful_repeats() {
    let catalog = InMemoryCatalog::new();
    catalog.record_invocation(1, 2, 10, true);
    catalog.record_invocation(1, 2, 10, true);
    catalog.record_invocation(1, 2, 10, false);
    catalog.record_invocation(3, 2, 10, true);

    let patterns = catalog.workflow_patterns(2).await.unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(
        (patterns[0].initiator_id, patterns[0].target_id, patterns[0].tool_id),
        (1, 2, 10)
    );
    assert_eq!(patterns[0].invocation_count, 2);
}

#[tokio::test]
async fn api_keys_resolve_by_hash_only() {
    let catalog = InMemoryCatalog::new();
    catalog.insert_user(UserRecord {
        id: 1,
        email: "a@b.c".to_string(),
        role: "user".to_string(),
        is_active: true,
    });
    catalog.insert_api_key(
        "kpe_plaintext",
        ApiKeyRecord {
            id: 1,
            user_id: 1,
            name: None,
            key_hash: String::new(),
            scopes: vec!["search".to_string()],
            active: true,
            expires_at: None,
            last_used: None,
            rate_limit: None,
        },
    );

    let hash = ApiKeyRecord::hash_key("kpe_plaintext");
    let record = catalog.api_key_by_hash(&hash).await.unwrap().unwrap();
    assert_eq!(record.id, 1);
    assert!(record.last_used.is_none());

    catalog.touch_api_key(1).await.unwrap();
    let touched = catalog.api_key_by_hash(&hash).await.unwrap().unwrap();
    assert!(touched.last_used.is_some());

    // the plaintext itself is not a lookup key
    assert!(catalog
        .api_key_by_hash("kpe_plaintext")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn request_counts_respect_the_window() {
    let catalog = InMemoryCatalog::new();
    let entry = kpath_domain::entities::RequestLogEntry {
        api_key_id: Some(1),
        user_id: 1,
        endpoint: "/api/v1/search".to_string(),
        method: "GET".to_string(),
        status_code: 200,
        response_time_ms: 4,
    };
    catalog.log_request_at(entry.clone(), Utc::now());
    catalog.log_request_at(entry.clone(), Utc::now() - chrono::Duration::minutes(61));
    catalog.log_request(entry).await.unwrap();

    let since = Utc::now() - chrono::Duration::minutes(60);
    assert_eq!(catalog.count_requests_since(1, since).await.unwrap(), 2);
    assert_eq!(catalog.count_requests_since(2, since).await.unwrap(), 0);
}
