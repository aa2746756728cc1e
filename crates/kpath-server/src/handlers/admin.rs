//! Index lifecycle endpoints (admin scope)

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde_json::{json, Value};
use tracing::{error, info};

use kpath_domain::entities::{Principal, SCOPE_ADMIN};

use crate::auth::require_scope;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// POST /search/rebuild - rebuild both indexes from the catalog
///
/// Long-running; runs in a background task and answers immediately.
pub async fn rebuild_index(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Value>> {
    require_scope(&principal, SCOPE_ADMIN)?;

    let lifecycle = state.lifecycle.clone();
    let user_id = principal.user_id;
    tokio::spawn(async move {
        match lifecycle.rebuild().await {
            Ok(()) => info!(user_id, "Index rebuilt"),
            Err(e) => error!(user_id, "Index rebuild failed: {}", e),
        }
    });

    Ok(Json(json!({
        "message": "Index rebuild started",
        "status": "processing",
    })))
}

/// POST /search/initialize - build indexes if none are loaded
pub async fn initialize_index(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Value>> {
    require_scope(&principal, SCOPE_ADMIN)?;

    let lifecycle = state.lifecycle.clone();
    let user_id = principal.user_id;
    tokio::spawn(async move {
        match lifecycle.initialize(true).await {
            Ok(()) => info!(user_id, "Search initialization complete"),
            Err(e) => error!(user_id, "Search initialization failed: {}", e),
        }
    });

    Ok(Json(json!({
        "message": "Search initialization started",
        "status": "processing",
    })))
}

/// POST /search/service/{id} - add one service to the index
pub async fn add_service(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(service_id): Path<i32>,
) -> ApiResult<Json<Value>> {
    require_scope(&principal, SCOPE_ADMIN)?;

    if state.lifecycle.add_service(service_id).await? {
        Ok(Json(json!({
            "message": format!("Service {} added to search index", service_id),
        })))
    } else {
        Err(ApiError::not_found(format!("Service {} not found", service_id)))
    }
}

/// PUT /search/service/{id} - re-embed one service
pub async fn update_service(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(service_id): Path<i32>,
) -> ApiResult<Json<Value>> {
    require_scope(&principal, SCOPE_ADMIN)?;

    if state.lifecycle.update_service(service_id).await? {
        Ok(Json(json!({
            "message": format!("Service {} updated in search index", service_id),
        })))
    } else {
        Err(ApiError::not_found(format!("Service {} not found", service_id)))
    }
}

/// DELETE /search/service/{id} - drop one service from the index
pub async fn remove_service(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(service_id): Path<i32>,
) -> ApiResult<Json<Value>> {
    require_scope(&principal, SCOPE_ADMIN)?;

    let removed = state.lifecycle.remove_service(service_id).await?;
    let message = if removed {
        format!("Service {} removed from search index", service_id)
    } else {
        format!("Service {} not found in search index", service_id)
    };
    Ok(Json(json!({ "message": message })))
}
