//! Authenticated identity types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scope required for search endpoints
pub const SCOPE_SEARCH: &str = "search";
/// Scope required for index lifecycle endpoints
pub const SCOPE_ADMIN: &str = "admin";

/// A system user as the auth store sees it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i32,
    pub email: String,
    pub role: String,
    pub is_active: bool,
}

/// Stored API key metadata
///
/// The plaintext key never reaches this type; only its SHA-256 hex digest
/// is stored and compared.
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub id: i32,
    pub user_id: i32,
    pub name: Option<String>,
    pub key_hash: String,
    pub scopes: Vec<String>,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
    /// Hourly request budget; `None` falls back to the configured default
    pub rate_limit: Option<u32>,
}

impl ApiKeyRecord {
    /// SHA-256 hex digest under which a plaintext key is stored
    pub fn hash_key(plaintext: &str) -> String {
        use sha2::{Digest, Sha256};
        hex::encode(Sha256::digest(plaintext.as_bytes()))
    }
}

/// How the current request was authenticated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Bearer JWT in the Authorization header
    Jwt,
    /// API key from the X-API-Key header or `api_key` query parameter
    ApiKey {
        key_id: i32,
        rate_limit: Option<u32>,
    },
}

/// The authenticated identity behind a request
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: i32,
    pub email: String,
    pub role: String,
    pub scopes: Vec<String>,
    pub auth: AuthMethod,
}

impl Principal {
    /// Whether the principal holds the given scope
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}
