//! Query planner behavior across the five search modes

use super::helpers::{service, stack, tool, with_capability, with_domain};
use kpath_application::composer::query_hash;
use kpath_domain::entities::NewFeedbackEvent;
use kpath_domain::ports::FeedbackStore;
use kpath_domain::value_objects::{EntityType, SearchMode, SearchRequest};
use serde_json::json;

fn request(query: &str, mode: SearchMode) -> SearchRequest {
    SearchRequest {
        query: query.to_string(),
        limit: 10,
        min_score: 0.0,
        domains: None,
        capabilities: None,
        include_orchestration: false,
        search_mode: mode,
    }
}

async fn seeded_stack() -> super::helpers::TestStack {
    let stack = stack(false);
    stack.catalog.insert_service(with_capability(
        service(1, "EmailService", "Send and manage email communications"),
        1,
        "SendEmail",
        "Send transactional and notification email",
    ));
    stack.catalog.insert_service(with_capability(
        service(2, "LedgerService", "Track accounting ledgers and balances"),
        2,
        "PostEntry",
        "Post a journal entry to the ledger",
    ));
    stack.catalog.insert_service(with_capability(
        service(3, "CalendarService", "Schedule meetings and manage calendars"),
        3,
        "BookMeeting",
        "Book a meeting slot on a calendar",
    ));
    stack.lifecycle.initialize(false).await.unwrap();
    stack
}

#[tokio::test]
async fn agents_only_ranks_the_relevant_service_first() {
    let stack = seeded_stack().await;

    let mut req = request("send notifications", SearchMode::AgentsOnly);
    req.limit = 3;
    let response = stack.planner.search(&req, 1).await.unwrap();

    assert!(response.total_results >= 1);
    assert_eq!(response.results[0].service.name, "EmailService");
    assert_eq!(response.results[0].rank, 1);
    assert!(response.results[0].score > 0.3);
    assert_eq!(response.results[0].entity_type, EntityType::Service);
}

#[tokio::test]
async fn response_invariants_hold() {
    let stack = seeded_stack().await;

    let mut req = request("manage accounting", SearchMode::AgentsOnly);
    req.limit = 2;
    let response = stack.planner.search(&req, 7).await.unwrap();

    assert!(response.results.len() <= 2);
    assert_eq!(response.total_results, response.results.len());
    assert_eq!(response.query, "manage accounting");
    assert_eq!(response.search_mode, SearchMode::AgentsOnly);
    assert_eq!(response.user_id, 7);
    for (index, record) in response.results.iter().enumerate() {
        assert_eq!(record.rank, (index + 1) as u32);
        if index > 0 {
            assert!(record.score <= response.results[index - 1].score);
        }
    }
}

#[tokio::test]
async fn min_score_one_returns_nothing() {
    let stack = seeded_stack().await;

    let mut req = request("send notifications", SearchMode::AgentsOnly);
    req.min_score = 1.0;
    let response = stack.planner.search(&req, 1).await.unwrap();
    assert_eq!(response.total_results, 0);
}

#[tokio::test]
async fn domain_filter_is_case_insensitive_exact() {
    let stack = stack(false);
    stack.catalog.insert_service(with_domain(
        service(1, "PaymentsService", "Process payments and refunds"),
        "Finance",
    ));
    stack.catalog.insert_service(with_domain(
        service(2, "ChatService", "Process messages and replies"),
        "Communication",
    ));
    stack.lifecycle.initialize(false).await.unwrap();

    let mut req = request("process requests", SearchMode::AgentsOnly);
    req.domains = Some(vec!["finance".to_string()]);
    let response = stack.planner.search(&req, 1).await.unwrap();

    assert_eq!(response.total_results, 1);
    assert_eq!(response.results[0].service.name, "PaymentsService");
}

#[tokio::test]
async fn capability_filter_matches_substring() {
    let stack = seeded_stack().await;

    let mut req = request("services", SearchMode::AgentsOnly);
    req.capabilities = Some(vec!["journal entry".to_string()]);
    let response = stack.planner.search(&req, 1).await.unwrap();

    assert_eq!(response.total_results, 1);
    assert_eq!(response.results[0].service.name, "LedgerService");
}

#[tokio::test]
async fn include_orchestration_attaches_tools() {
    let stack = seeded_stack().await;
    stack
        .catalog
        .insert_tool(tool(10, 1, "send_email", "Send an email to a recipient"));
    stack.lifecycle.rebuild().await.unwrap();

    let mut req = request("email communications", SearchMode::AgentsOnly);
    req.include_orchestration = true;
    let response = stack.planner.search(&req, 1).await.unwrap();

    let email = response
        .results
        .iter()
        .find(|r| r.service.name == "EmailService")
        .expect("EmailService in results");
    let tools = email.service.tools.as_ref().expect("tools attached");
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].tool_name, "send_email");
}

#[tokio::test]
async fn tools_only_recommends_the_best_tool() {
    let stack = seeded_stack().await;
    let mut send_tool = tool(10, 1, "send_email", "Send an email to a customer recipient");
    send_tool.input_schema = Some(json!({
        "type": "object",
        "properties": {"to": {}, "subject": {}, "body": {}}
    }));
    stack.catalog.insert_tool(send_tool);
    stack.catalog.insert_tool(tool(
        11,
        1,
        "create_template",
        "Create a reusable message template",
    ));
    stack.lifecycle.rebuild().await.unwrap();

    let mut req = request("dispatch an email to a customer", SearchMode::ToolsOnly);
    req.limit = 1;
    let response = stack.planner.search(&req, 1).await.unwrap();

    assert_eq!(response.total_results, 1);
    let record = &response.results[0];
    assert_eq!(record.entity_type, EntityType::ServiceWithTool);
    assert_eq!(record.service.name, "EmailService");

    let recommended = record.recommended_tool.as_ref().expect("recommended tool");
    assert_eq!(recommended.tool_name, "send_email");
    assert!(recommended.recommendation_reason.contains("dispatch an email"));
    assert!((record.distance.unwrap() - (1.0 - record.score)).abs() < 1e-6);
}

#[tokio::test]
async fn agents_and_tools_merges_and_reranks() {
    let stack = seeded_stack().await;
    stack
        .catalog
        .insert_tool(tool(10, 1, "send_email", "Send an email notification"));
    stack.lifecycle.rebuild().await.unwrap();

    let mut req = request("send email notifications", SearchMode::AgentsAndTools);
    req.limit = 4;
    let response = stack.planner.search(&req, 1).await.unwrap();

    assert!(response.results.len() <= 4);
    assert!(response
        .results
        .iter()
        .any(|r| r.entity_type == EntityType::Service));
    assert!(response
        .results
        .iter()
        .any(|r| r.entity_type == EntityType::ServiceWithTool));
    for (index, record) in response.results.iter().enumerate() {
        assert_eq!(record.rank, (index + 1) as u32);
    }
}

#[tokio::test]
async fn workflows_mode_is_rejected_when_disabled() {
    let stack = seeded_stack().await;
    let result = stack
        .planner
        .search(&request("email", SearchMode::Workflows), 1)
        .await;
    assert!(matches!(
        result.unwrap_err(),
        kpath_domain::Error::Validation { .. }
    ));
}

#[tokio::test]
async fn workflows_mode_ranks_recurring_patterns() {
    let stack = stack(true);
    stack
        .catalog
        .insert_service(service(1, "OrderService", "Manage customer orders"));
    stack
        .catalog
        .insert_service(service(2, "EmailService", "Send email"));
    stack
        .catalog
        .insert_tool(tool(10, 2, "send_email", "Send an email"));
    stack.lifecycle.initialize(false).await.unwrap();

    // two successes qualify; the single success and the failure do not
    stack.catalog.record_invocation(1, 2, 10, true);
    stack.catalog.record_invocation(1, 2, 10, true);
    stack.catalog.record_invocation(2, 1, 10, true);
    stack.catalog.record_invocation(1, 2, 10, false);

    let response = stack
        .planner
        .search(&request("order email", SearchMode::Workflows), 1)
        .await
        .unwrap();

    assert_eq!(response.total_results, 1);
    let record = &response.results[0];
    assert_eq!(record.entity_type, EntityType::Workflow);
    let workflow = record.workflow_data.as_ref().expect("workflow data");
    assert_eq!(workflow.initiator_id, 1);
    assert_eq!(workflow.target_id, 2);
    assert_eq!(workflow.invocation_count, 2);
    assert_eq!(
        workflow.description,
        "OrderService calls EmailService using send_email"
    );
}

#[tokio::test]
async fn capabilities_mode_deduplicates_by_service() {
    let stack = stack(false);
    let svc = with_capability(
        with_capability(
            service(1, "EmailService", "Email platform"),
            1,
            "SendEmail",
            "Send transactional email",
        ),
        2,
        "TrackEmail",
        "Track email delivery status",
    );
    stack.catalog.insert_service(svc);
    stack
        .catalog
        .insert_service(service(2, "CalendarService", "Manage calendars"));
    stack.lifecycle.initialize(false).await.unwrap();

    let response = stack
        .planner
        .search(&request("email delivery", SearchMode::Capabilities), 1)
        .await
        .unwrap();

    let email_records = response
        .results
        .iter()
        .filter(|r| r.service_id == 1)
        .count();
    assert_eq!(email_records, 1);
    assert!(response
        .results
        .iter()
        .all(|r| r.entity_type == EntityType::Capability));
}

#[tokio::test]
async fn feedback_moves_a_near_tie_to_rank_one() {
    let stack = stack(false);
    stack
        .catalog
        .insert_service(service(1, "NotifyAlpha", "send notifications to users"));
    stack
        .catalog
        .insert_service(service(2, "NotifyBeta", "send notifications to users"));
    stack.lifecycle.initialize(false).await.unwrap();

    let query = "send notifications";
    let hash = query_hash(query);

    // twenty click-throughs for the second service on this exact query
    for _ in 0..20 {
        stack
            .catalog
            .record_feedback(NewFeedbackEvent {
                query: query.to_string(),
                query_hash: hash.clone(),
                service_id: 2,
                user_id: 1,
                rank: 2,
                click_through: true,
                user_satisfaction: None,
            })
            .await
            .unwrap();
    }
    stack.ranker.invalidate_service(2);

    let response = stack
        .planner
        .search(&request(query, SearchMode::AgentsOnly), 1)
        .await
        .unwrap();

    assert_eq!(response.results[0].service_id, 2);
    assert_eq!(response.results[0].rank, 1);
}

#[tokio::test]
async fn removed_service_disappears_until_rebuild() {
    let stack = seeded_stack().await;
    let req = request("send notifications email", SearchMode::AgentsOnly);

    let before = stack.planner.search(&req, 1).await.unwrap();
    assert!(before.results.iter().any(|r| r.service_id == 1));

    stack.lifecycle.remove_service(1).await.unwrap();
    let during = stack.planner.search(&req, 1).await.unwrap();
    assert!(during.results.iter().all(|r| r.service_id != 1));

    stack.lifecycle.rebuild().await.unwrap();
    let after = stack.planner.search(&req, 1).await.unwrap();
    let ranking = |response: &kpath_domain::value_objects::SearchResponse| {
        response
            .results
            .iter()
            .map(|r| r.service_id)
            .collect::<Vec<_>>()
    };
    assert_eq!(ranking(&before), ranking(&after));
}

#[tokio::test]
async fn similar_services_excludes_the_target() {
    let stack = seeded_stack().await;

    let records = stack.planner.similar_services(1, 5, 0.0).await.unwrap();
    assert!(records.iter().all(|r| r.service_id != 1));
    for (index, record) in records.iter().enumerate() {
        assert_eq!(record.rank, (index + 1) as u32);
    }

    let missing = stack.planner.similar_services(99, 5, 0.0).await;
    assert!(matches!(
        missing.unwrap_err(),
        kpath_domain::Error::NotFound { .. }
    ));
}
