//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub search: SearchConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Per-request deadline in seconds
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            request_timeout_secs: 30,
        }
    }
}

/// Catalog store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres connection string; empty selects the in-memory catalog
    pub url: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: 8,
        }
    }
}

/// Search subsystem settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Root directory for models/ and indexes/ artifacts
    pub artifact_dir: PathBuf,
    /// Pretrained embedding model name
    pub embedding_model: String,
    /// Fallback embedder target dimension
    pub embedding_dimension: usize,
    /// Whether workflow-mode search is available
    pub workflows_enabled: bool,
    /// Hourly request budget for keys without an explicit limit
    pub default_rate_limit: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("data"),
            embedding_model: "all-minilm-l6-v2".to_string(),
            embedding_dimension: 384,
            workflows_enabled: false,
            default_rate_limit: 1000,
        }
    }
}

/// Authentication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret for bearer tokens
    pub jwt_secret: String,
    /// Token lifetime issued by companion tooling, minutes
    pub access_token_expire_minutes: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_expire_minutes: 30,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. "info" or "kpath=debug,info"
    pub level: String,
    pub json_format: bool,
    /// Optional daily-rolling log file
    pub file_output: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            file_output: None,
        }
    }
}
