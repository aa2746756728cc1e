//! Search endpoints

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use axum_extra::extract::Query;
use serde_json::{json, Value};
use tracing::{info, warn};

use kpath_domain::entities::{Principal, SearchLogEntry, SCOPE_SEARCH};
use kpath_domain::value_objects::SearchResponse;

use crate::auth::require_scope;
use crate::error::{ApiError, ApiResult};
use crate::models::{SearchQueryParams, SearchRequestDto, SimilarParams};
use crate::state::AppState;

/// POST /search - semantic search over the catalog
pub async fn search_post(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<SearchRequestDto>, JsonRejection>,
) -> ApiResult<Json<SearchResponse>> {
    require_scope(&principal, SCOPE_SEARCH)?;
    let Json(dto) = payload.map_err(map_json_rejection)?;
    run_search(&state, &principal, dto).await
}

/// GET /search - the same contract as query parameters
///
/// List fields repeat the parameter name; authentication may come from the
/// `api_key` parameter, which the auth layer has already consumed.
pub async fn search_get(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<SearchQueryParams>,
) -> ApiResult<Json<SearchResponse>> {
    require_scope(&principal, SCOPE_SEARCH)?;
    let dto = params.into_dto()?;
    run_search(&state, &principal, dto).await
}

async fn run_search(
    state: &AppState,
    principal: &Principal,
    dto: SearchRequestDto,
) -> ApiResult<Json<SearchResponse>> {
    let request = dto.into_domain()?;
    let response = state.planner.search(&request, principal.user_id).await?;

    info!(
        user_id = principal.user_id,
        query = %request.query,
        mode = request.search_mode.as_str(),
        results = response.total_results,
        elapsed_ms = response.search_time_ms,
        "Search served"
    );

    // Query-log row feeds analytics; failures never fail the search
    let entry = SearchLogEntry {
        query: request.query.clone(),
        user_id: principal.user_id,
        results_count: response.total_results,
        response_time_ms: response.search_time_ms as i64,
    };
    let store = state.auth_store.clone();
    tokio::spawn(async move {
        if let Err(e) = store.log_search(entry).await {
            warn!("Failed to log search query: {}", e);
        }
    });

    Ok(Json(response))
}

/// GET /search/similar/{service_id} - services similar to a known one
pub async fn similar_services(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(service_id): Path<i32>,
    Query(params): Query<SimilarParams>,
) -> ApiResult<Json<Value>> {
    require_scope(&principal, SCOPE_SEARCH)?;

    let records = state
        .planner
        .similar_services(
            service_id,
            params.limit.unwrap_or(10).clamp(1, 100),
            params.min_score.unwrap_or(0.0),
        )
        .await?;

    let total_results = records.len();
    Ok(Json(json!({
        "target_service_id": service_id,
        "similar_services": records,
        "total_results": total_results,
    })))
}

fn map_json_rejection(rejection: JsonRejection) -> ApiError {
    match rejection {
        JsonRejection::JsonDataError(e) => ApiError::validation(e.to_string()),
        other => ApiError::bad_request(other.to_string()),
    }
}
