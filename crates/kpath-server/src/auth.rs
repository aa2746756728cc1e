//! Request authentication
//!
//! Three mechanisms, tried in order: bearer JWT in `Authorization`, API
//! key in `X-API-Key`, API key as the `api_key` query parameter. The first
//! to succeed yields the principal; all failing yields 401 without
//! revealing whether a presented key exists.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use jsonwebtoken::{decode, DecodingKey, Validation};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};

use kpath_domain::entities::{ApiKeyRecord, AuthMethod, Principal, SCOPE_SEARCH};
use kpath_domain::error::{Error, Result};

use crate::rate_limit::check_rate_limit;
use crate::state::AppState;

/// Prefix identifying KPATH API keys
pub const API_KEY_PREFIX: &str = "kpe_";
/// Random alphanumerics following the prefix
pub const API_KEY_RANDOM_LEN: usize = 32;

/// Generate a fresh API key (`kpe_` + 32 alphanumerics)
///
/// The plaintext is returned exactly once; only its hash is ever stored.
pub fn generate_api_key() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", API_KEY_PREFIX, random)
}

/// Bearer token claims
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[allow(dead_code)]
    exp: usize,
}

/// Scopes a bearer principal derives from its role
fn scopes_for_role(role: &str) -> Vec<String> {
    match role {
        "admin" => vec!["search".to_string(), "admin".to_string()],
        _ => vec![SCOPE_SEARCH.to_string()],
    }
}

/// Resolve a principal from a bearer token
async fn authenticate_jwt(state: &AppState, token: &str) -> Option<Principal> {
    if state.auth.jwt_secret.is_empty() {
        return None;
    }
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;

    let user_id: i32 = decoded.claims.sub.parse().ok()?;
    let user = match state.auth_store.user_by_id(user_id).await {
        Ok(Some(user)) if user.is_active => user,
        Ok(_) => return None,
        Err(e) => {
            warn!("User lookup failed during JWT auth: {}", e);
            return None;
        }
    };

    let role = decoded.claims.role.unwrap_or_else(|| user.role.clone());
    Some(Principal {
        user_id: user.id,
        email: decoded.claims.email.unwrap_or_else(|| user.email.clone()),
        scopes: scopes_for_role(&role),
        role,
        auth: AuthMethod::Jwt,
    })
}

/// Resolve a principal from an API key, enforcing the hourly rate limit
///
/// Returns `Ok(None)` for unknown/inactive/expired keys (falls through to
/// the next mechanism) and `Err(RateLimited)` when the key is valid but
/// over budget.
async fn authenticate_api_key(state: &AppState, plaintext: &str) -> Result<Option<Principal>> {
    let key_hash = ApiKeyRecord::hash_key(plaintext);
    let record = match state.auth_store.api_key_by_hash(&key_hash).await {
        Ok(Some(record)) => record,
        Ok(None) => return Ok(None),
        Err(e) => {
            warn!("API key lookup failed: {}", e);
            return Ok(None);
        }
    };

    if !record.active {
        return Ok(None);
    }
    if record.expires_at.is_some_and(|expires| expires < Utc::now()) {
        debug!(key_id = record.id, "Rejected expired API key");
        return Ok(None);
    }

    let user = match state.auth_store.user_by_id(record.user_id).await {
        Ok(Some(user)) if user.is_active => user,
        Ok(_) => return Ok(None),
        Err(e) => {
            warn!("User lookup failed during API key auth: {}", e);
            return Ok(None);
        }
    };

    let limit = record.rate_limit.unwrap_or(state.auth.default_rate_limit);
    let status = check_rate_limit(state.auth_store.as_ref(), record.id, limit).await?;
    if !status.allowed {
        return Err(Error::RateLimited { limit });
    }

    if let Err(e) = state.auth_store.touch_api_key(record.id).await {
        warn!(key_id = record.id, "Failed to touch API key: {}", e);
    }

    Ok(Some(Principal {
        user_id: user.id,
        email: user.email,
        role: user.role,
        scopes: record.scopes.clone(),
        auth: AuthMethod::ApiKey {
            key_id: record.id,
            rate_limit: record.rate_limit,
        },
    }))
}

/// Pull `api_key` out of a raw query string
///
/// Keys are `kpe_` plus alphanumerics, so no percent-decoding is needed.
fn api_key_from_query(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == "api_key")
        .map(|(_, value)| value.to_string())
}

/// Authenticate the request against the three mechanisms in order
pub async fn resolve_principal(state: &AppState, request: &Request<Body>) -> Result<Principal> {
    if let Some(token) = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        if let Some(principal) = authenticate_jwt(state, token).await {
            return Ok(principal);
        }
    }

    if let Some(key) = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(principal) = authenticate_api_key(state, key).await? {
            return Ok(principal);
        }
    }

    if let Some(key) = api_key_from_query(request.uri().query()) {
        if let Some(principal) = authenticate_api_key(state, &key).await? {
            return Ok(principal);
        }
    }

    Err(Error::authentication("No valid credentials presented"))
}

/// Middleware attaching the authenticated principal to the request
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match resolve_principal(&state, &request).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(error) => crate::error::ApiError::from(error).into_response(),
    }
}

/// Ensure the principal carries a scope, or fail with 403
pub fn require_scope(principal: &Principal, scope: &str) -> Result<()> {
    if principal.has_scope(scope) {
        Ok(())
    } else {
        Err(Error::authorization(format!(
            "Scope '{}' required for this endpoint",
            scope
        )))
    }
}
