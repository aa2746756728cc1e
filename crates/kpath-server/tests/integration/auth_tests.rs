//! Authentication, authorization, and rate limiting

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::json;

use kpath_domain::entities::RequestLogEntry;

use super::helpers::{
    jwt_for, search_post, send, test_app, ADMIN_KEY, LIMITED_KEY, SEARCH_KEY,
};

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn health_needs_no_credentials() {
    let app = test_app(true).await;
    let (status, body, _) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn missing_credentials_yield_401_with_challenge() {
    let app = test_app(true).await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/search")
        .header("content-type", "application/json")
        .body(Body::from(json!({"query": "email"}).to_string()))
        .unwrap();

    let (status, body, headers) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");
    assert_eq!(headers["www-authenticate"], "Bearer");
}

#[tokio::test]
async fn unknown_api_key_yields_401_without_detail() {
    let app = test_app(true).await;
    let (status, body, _) =
        send(&app.router, search_post("kpe_doesNotExist0000000000000000", json!({"query": "x"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    // the body never reveals whether the key existed
    assert_eq!(body["message"], "Could not validate credentials");
}

#[tokio::test]
async fn api_key_header_authenticates() {
    let app = test_app(true).await;
    let (status, body, _) =
        send(&app.router, search_post(SEARCH_KEY, json!({"query": "send email"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], 1);
}

#[tokio::test]
async fn api_key_query_parameter_authenticates() {
    let app = test_app(true).await;
    let (status, body, _) = send(
        &app.router,
        get(&format!("/api/v1/search?query=send+email&api_key={}", SEARCH_KEY)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["search_mode"], "agents_only");
}

#[tokio::test]
async fn bearer_jwt_authenticates() {
    let app = test_app(true).await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/search")
        .header("Authorization", format!("Bearer {}", jwt_for(1, "user")))
        .header("content-type", "application/json")
        .body(Body::from(json!({"query": "send email"}).to_string()))
        .unwrap();

    let (status, body, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], 1);
}

#[tokio::test]
async fn garbage_bearer_token_yields_401() {
    let app = test_app(true).await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/search")
        .header("Authorization", "Bearer not-a-jwt")
        .header("content-type", "application/json")
        .body(Body::from(json!({"query": "x"}).to_string()))
        .unwrap();

    let (status, _, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn search_scope_cannot_reach_admin_endpoints() {
    let app = test_app(true).await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/search/rebuild")
        .header("X-API-Key", SEARCH_KEY)
        .body(Body::empty())
        .unwrap();

    let (status, body, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn admin_scope_reaches_admin_endpoints() {
    let app = test_app(true).await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/search/rebuild")
        .header("X-API-Key", ADMIN_KEY)
        .body(Body::empty())
        .unwrap();

    let (status, body, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "processing");
}

#[tokio::test]
async fn admin_role_jwt_carries_admin_scope() {
    let app = test_app(true).await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/search/rebuild")
        .header("Authorization", format!("Bearer {}", jwt_for(2, "admin")))
        .body(Body::empty())
        .unwrap();

    let (status, _, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
}

fn limited_log_entry() -> RequestLogEntry {
    RequestLogEntry {
        api_key_id: Some(3),
        user_id: 1,
        endpoint: "/api/v1/search".to_string(),
        method: "POST".to_string(),
        status_code: 200,
        response_time_ms: 5,
    }
}

#[tokio::test]
async fn fourth_request_within_the_hour_is_rate_limited() {
    let app = test_app(true).await;
    for _ in 0..3 {
        app.catalog.log_request_at(limited_log_entry(), Utc::now());
    }

    let (status, body, headers) =
        send(&app.router, search_post(LIMITED_KEY, json!({"query": "email"}))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers["X-RateLimit-Limit"], "3");
    assert_eq!(headers["X-RateLimit-Remaining"], "0");
    assert_eq!(body["error"], "rate_limit_exceeded");
}

#[tokio::test]
async fn requests_older_than_an_hour_free_the_budget() {
    let app = test_app(true).await;
    let aged = Utc::now() - Duration::minutes(61);
    for _ in 0..3 {
        app.catalog.log_request_at(limited_log_entry(), aged);
    }

    let (status, _, _) =
        send(&app.router, search_post(LIMITED_KEY, json!({"query": "email"}))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn uninitialized_index_yields_503() {
    let app = test_app(false).await;
    let (status, body, _) =
        send(&app.router, search_post(SEARCH_KEY, json!({"query": "email"}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "index_unavailable");
}
