//! Feedback capture and feedback analytics reads

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use axum_extra::extract::Query;
use serde_json::{json, Value};
use tracing::{info, warn};
use validator::Validate;

use kpath_application::composer::query_hash;
use kpath_domain::entities::{NewFeedbackEvent, Principal, SCOPE_SEARCH};

use crate::auth::require_scope;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    flatten_validation_errors, FeedbackRequestDto, FeedbackStatsParams, PopularQueriesParams,
};
use crate::state::AppState;

/// POST /search/feedback - record a selection event
///
/// Writes are best-effort: a failed append is logged and swallowed so a
/// feedback outage never degrades the search path callers are on.
pub async fn submit_feedback(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<FeedbackRequestDto>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    require_scope(&principal, SCOPE_SEARCH)?;
    let Json(dto) = payload.map_err(|rejection| match rejection {
        JsonRejection::JsonDataError(e) => ApiError::validation(e.to_string()),
        other => ApiError::bad_request(other.to_string()),
    })?;
    dto.validate()
        .map_err(|e| ApiError::validation(flatten_validation_errors(&e)))?;

    let event = NewFeedbackEvent {
        query_hash: query_hash(&dto.query),
        query: dto.query.clone(),
        service_id: dto.service_id,
        user_id: principal.user_id,
        rank: dto.rank,
        click_through: dto.feedback_type.is_click_through(),
        user_satisfaction: dto.score,
    };

    let feedback_id = match state.feedback.record_feedback(event).await {
        Ok(id) => {
            info!(
                user_id = principal.user_id,
                service_id = dto.service_id,
                feedback_type = ?dto.feedback_type,
                "Feedback recorded"
            );
            state.ranker.invalidate_service(dto.service_id);
            Some(id)
        }
        Err(e) => {
            warn!(service_id = dto.service_id, "Failed to record feedback: {}", e);
            None
        }
    };

    Ok(Json(json!({
        "message": "Feedback recorded successfully",
        "feedback_id": feedback_id,
    })))
}

/// GET /search/feedback/stats - per-service aggregated feedback
pub async fn feedback_stats(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<FeedbackStatsParams>,
) -> ApiResult<Json<Value>> {
    require_scope(&principal, SCOPE_SEARCH)?;

    let stats = state
        .feedback
        .feedback_stats(params.service_id, params.limit.unwrap_or(10).clamp(1, 100))
        .await?;

    let total_services = stats.len();
    Ok(Json(json!({
        "stats": stats,
        "total_services": total_services,
    })))
}

/// GET /search/feedback/queries - most frequent queries
pub async fn popular_queries(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<PopularQueriesParams>,
) -> ApiResult<Json<Value>> {
    require_scope(&principal, SCOPE_SEARCH)?;

    let queries = state
        .feedback
        .popular_queries(params.limit.unwrap_or(20).clamp(1, 100))
        .await?;

    let total_queries = queries.len();
    Ok(Json(json!({
        "popular_queries": queries,
        "total_queries": total_queries,
    })))
}
