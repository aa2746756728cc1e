//! Index status endpoint

use axum::extract::State;
use axum::{Extension, Json};

use kpath_application::IndexStatusReport;
use kpath_domain::entities::{Principal, SCOPE_SEARCH};

use crate::auth::require_scope;
use crate::error::ApiResult;
use crate::state::AppState;

/// GET /search/status - lifecycle and artifact status
pub async fn search_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<IndexStatusReport>> {
    require_scope(&principal, SCOPE_SEARCH)?;
    Ok(Json(state.lifecycle.status()))
}
