//! Router assembly and cross-cutting middleware
//!
//! Middleware nesting, outermost first: deadline → authentication →
//! request logging → handler. The deadline covers auth store reads; the
//! request log runs with the resolved principal in scope.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::warn;

use kpath_domain::entities::{AuthMethod, Principal, RequestLogEntry};

use crate::auth::auth_middleware;
use crate::error::ApiError;
use crate::handlers::{admin, feedback, health, search, status};
use crate::state::AppState;

/// Build the full application router
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/search", post(search::search_post).get(search::search_get))
        .route("/search/feedback", post(feedback::submit_feedback))
        .route("/search/feedback/stats", get(feedback::feedback_stats))
        .route("/search/feedback/queries", get(feedback::popular_queries))
        .route("/search/status", get(status::search_status))
        .route("/search/rebuild", post(admin::rebuild_index))
        .route("/search/initialize", post(admin::initialize_index))
        .route("/search/similar/:service_id", get(search::similar_services))
        .route(
            "/search/service/:service_id",
            post(admin::add_service)
                .put(admin::update_service)
                .delete(admin::remove_service),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            request_log_middleware,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            deadline_middleware,
        ))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
}

/// Enforce the per-request deadline; expiry maps to 504
pub async fn deadline_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match tokio::time::timeout(state.request_timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => ApiError::deadline_exceeded().into_response(),
    }
}

/// Append one request-log row per authenticated request
pub async fn request_log_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let endpoint = request.uri().path().to_string();
    let principal = request.extensions().get::<Principal>().cloned();

    let response = next.run(request).await;

    if let Some(principal) = principal {
        let api_key_id = match principal.auth {
            AuthMethod::ApiKey { key_id, .. } => Some(key_id),
            AuthMethod::Jwt => None,
        };
        let entry = RequestLogEntry {
            api_key_id,
            user_id: principal.user_id,
            endpoint,
            method,
            status_code: response.status().as_u16(),
            response_time_ms: started.elapsed().as_millis() as i64,
        };
        let store = state.auth_store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.log_request(entry).await {
                warn!("Failed to log API request: {}", e);
            }
        });
    }

    response
}
