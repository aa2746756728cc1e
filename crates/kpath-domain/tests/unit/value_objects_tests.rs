//! Wire-contract stability of the search value objects

use chrono::Utc;
use kpath_domain::value_objects::{
    Embedding, EntityType, SearchMode, SearchRecord, SearchResponse, ServiceView,
};
use serde_json::json;

fn minimal_view() -> ServiceView {
    ServiceView {
        id: 1,
        name: "EmailService".to_string(),
        description: "Send email".to_string(),
        endpoint: None,
        version: None,
        status: "active".to_string(),
        tool_type: None,
        visibility: None,
        interaction_modes: vec![],
        capabilities: vec![],
        domains: vec![],
        tags: vec![],
        default_timeout_ms: None,
        default_retry_policy: None,
        success_criteria: None,
        integration_details: None,
        agent_protocol_details: None,
        tools: None,
        orchestration: None,
    }
}

#[test]
fn search_mode_serializes_snake_case() {
    assert_eq!(SearchMode::AgentsOnly.as_str(), "agents_only");
    assert_eq!(
        serde_json::to_value(SearchMode::AgentsAndTools).unwrap(),
        json!("agents_and_tools")
    );
    let parsed: SearchMode = serde_json::from_value(json!("tools_only")).unwrap();
    assert_eq!(parsed, SearchMode::ToolsOnly);
}

#[test]
fn entity_type_wire_names() {
    assert_eq!(
        serde_json::to_value(EntityType::ServiceWithTool).unwrap(),
        json!("service_with_tool")
    );
    assert_eq!(
        serde_json::to_value(EntityType::Capability).unwrap(),
        json!("capability")
    );
}

#[test]
fn absent_optional_record_fields_are_omitted() {
    let record = SearchRecord {
        service_id: 1,
        score: 0.8,
        rank: 1,
        entity_type: EntityType::Service,
        service: minimal_view(),
        recommended_tool: None,
        workflow_data: None,
        distance: None,
    };
    let value = serde_json::to_value(&record).unwrap();
    assert!(value.get("recommended_tool").is_none());
    assert!(value.get("workflow_data").is_none());
    assert!(value.get("distance").is_none());
    // required envelope fields stay present
    assert_eq!(value["service_id"], 1);
    assert_eq!(value["rank"], 1);
    assert!(value["service"]["integration_details"].is_null());
}

#[test]
fn response_envelope_field_names() {
    let response = SearchResponse {
        query: "send email".to_string(),
        results: vec![],
        total_results: 0,
        search_time_ms: 12.5,
        user_id: 7,
        timestamp: Utc::now(),
        search_mode: SearchMode::AgentsOnly,
    };
    let value = serde_json::to_value(&response).unwrap();
    for field in [
        "query",
        "results",
        "total_results",
        "search_time_ms",
        "user_id",
        "timestamp",
        "search_mode",
    ] {
        assert!(value.get(field).is_some(), "missing field {}", field);
    }
}

#[test]
fn embedding_constructors_track_dimensions() {
    let embedding = Embedding::new(vec![0.1, 0.2], "test");
    assert_eq!(embedding.dimensions, 2);
    assert!(!embedding.is_zero());

    let zeros = Embedding::zeros(4, "test");
    assert_eq!(zeros.dimensions, 4);
    assert!(zeros.is_zero());
}
