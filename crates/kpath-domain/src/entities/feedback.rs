//! Feedback and observation records
//!
//! All three record types are append-only: the ranker and the rate limiter
//! only ever aggregate over them, nothing mutates a row after insert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A durable record that a principal selected (or reacted to) a search
/// result for a given query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub id: i64,
    pub query: String,
    /// SHA-256 of the lowercased, trimmed query; groups equal queries
    pub query_hash: String,
    pub service_id: i32,
    pub user_id: i32,
    /// 1-based rank the service held when selected
    pub rank: i32,
    pub click_through: bool,
    pub user_satisfaction: Option<f32>,
    pub timestamp: DateTime<Utc>,
}

/// Feedback event prior to persistence (no id, store assigns the timestamp)
#[derive(Debug, Clone)]
pub struct NewFeedbackEvent {
    pub query: String,
    pub query_hash: String,
    pub service_id: i32,
    pub user_id: i32,
    pub rank: i32,
    pub click_through: bool,
    pub user_satisfaction: Option<f32>,
}

/// One row per API request, used for analytics and the hourly rate window
#[derive(Debug, Clone)]
pub struct RequestLogEntry {
    pub api_key_id: Option<i32>,
    pub user_id: i32,
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub response_time_ms: i64,
}

/// One row per search, feeding the popularity/recency signals
#[derive(Debug, Clone)]
pub struct SearchLogEntry {
    pub query: String,
    pub user_id: i32,
    pub results_count: usize,
    pub response_time_ms: i64,
}
