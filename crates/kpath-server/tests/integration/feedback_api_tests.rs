//! Feedback capture endpoint and analytics reads

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;

use super::helpers::{send, test_app, SEARCH_KEY};

fn feedback_post(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/search/feedback")
        .header("X-API-Key", SEARCH_KEY)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("X-API-Key", SEARCH_KEY)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn click_feedback_is_recorded() {
    let app = test_app(true).await;
    let (status, body, _) = send(
        &app.router,
        feedback_post(json!({
            "query": "send email",
            "service_id": 1,
            "rank": 1,
            "feedback_type": "click",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Feedback recorded successfully");
    assert!(body["feedback_id"].as_i64().is_some());
    assert_eq!(app.catalog.feedback_count(), 1);
}

#[tokio::test]
async fn satisfaction_score_is_accepted_in_range() {
    let app = test_app(true).await;
    let (status, _, _) = send(
        &app.router,
        feedback_post(json!({
            "query": "send email",
            "service_id": 1,
            "rank": 2,
            "feedback_type": "relevant",
            "score": 4.5,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn out_of_range_score_fails_validation() {
    let app = test_app(true).await;
    let (status, _, _) = send(
        &app.router,
        feedback_post(json!({
            "query": "send email",
            "service_id": 1,
            "rank": 1,
            "feedback_type": "click",
            "score": 6.0,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.catalog.feedback_count(), 0);
}

#[tokio::test]
async fn unknown_feedback_type_fails_validation() {
    let app = test_app(true).await;
    let (status, _, _) = send(
        &app.router,
        feedback_post(json!({
            "query": "send email",
            "service_id": 1,
            "rank": 1,
            "feedback_type": "shrug",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn zero_rank_fails_validation() {
    let app = test_app(true).await;
    let (status, _, _) = send(
        &app.router,
        feedback_post(json!({
            "query": "send email",
            "service_id": 1,
            "rank": 0,
            "feedback_type": "click",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn feedback_stats_aggregate_by_service() {
    let app = test_app(true).await;
    for _ in 0..3 {
        let (status, _, _) = send(
            &app.router,
            feedback_post(json!({
                "query": "send email",
                "service_id": 1,
                "rank": 1,
                "feedback_type": "click",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body, _) = send(&app.router, get("/api/v1/search/feedback/stats")).await;
    assert_eq!(status, StatusCode::OK);
    let stats = body["stats"].as_array().unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0]["service_id"], 1);
    assert_eq!(stats[0]["service_name"], "EmailService");
    assert_eq!(stats[0]["total_clicks"], 3);
}

#[tokio::test]
async fn popular_queries_count_distinct_queries() {
    let app = test_app(true).await;
    for query in ["send email", "send email", "book meeting"] {
        send(
            &app.router,
            feedback_post(json!({
                "query": query,
                "service_id": 1,
                "rank": 1,
                "feedback_type": "select",
            })),
        )
        .await;
    }

    let (status, body, _) = send(&app.router, get("/api/v1/search/feedback/queries")).await;
    assert_eq!(status, StatusCode::OK);
    let queries = body["popular_queries"].as_array().unwrap();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0]["query"], "send email");
    assert_eq!(queries[0]["search_count"], 2);
    assert_eq!(body["total_queries"], 2);
}

#[tokio::test]
async fn feedback_reorders_subsequent_searches() {
    let app = test_app(true).await;

    // LedgerService starts behind EmailService for this query; twenty
    // click-throughs must lift it to rank one
    for _ in 0..20 {
        send(
            &app.router,
            feedback_post(json!({
                "query": "send communications",
                "service_id": 2,
                "rank": 2,
                "feedback_type": "click",
            })),
        )
        .await;
    }

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/search")
        .header("X-API-Key", SEARCH_KEY)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"query": "send communications", "limit": 2}).to_string(),
        ))
        .unwrap();
    let (status, body, _) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["service_id"], 2);
}
