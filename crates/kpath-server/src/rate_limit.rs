//! Per-key hourly rate limiting
//!
//! The budget is a count of request-log rows over the trailing 60 minutes,
//! so limits survive restarts and need no in-process counters.

use chrono::{Duration, Utc};

use kpath_domain::error::Result;
use kpath_domain::ports::AuthStore;

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy)]
pub struct RateStatus {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
}

/// Check an API key against its hourly budget
pub async fn check_rate_limit(
    store: &dyn AuthStore,
    api_key_id: i32,
    limit: u32,
) -> Result<RateStatus> {
    let since = Utc::now() - Duration::minutes(60);
    let used = store.count_requests_since(api_key_id, since).await?;

    Ok(RateStatus {
        allowed: used < limit as u64,
        limit,
        remaining: (limit as u64).saturating_sub(used) as u32,
    })
}
