//! Shared application state

use std::sync::Arc;
use std::time::Duration;

use kpath_application::{FeedbackRanker, IndexLifecycleManager, QueryPlanner};
use kpath_domain::ports::{AuthStore, FeedbackStore};

/// Authentication settings the request path needs
#[derive(Clone)]
pub struct AuthSettings {
    /// HS256 secret for bearer tokens; empty disables JWT auth
    pub jwt_secret: String,
    /// Hourly budget for API keys without an explicit limit
    pub default_rate_limit: u32,
}

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub planner: Arc<QueryPlanner>,
    pub lifecycle: Arc<IndexLifecycleManager>,
    pub feedback: Arc<dyn FeedbackStore>,
    pub auth_store: Arc<dyn AuthStore>,
    pub ranker: Arc<FeedbackRanker>,
    pub auth: AuthSettings,
    /// Per-request deadline
    pub request_timeout: Duration,
}
