//! Feedback-driven re-ranking
//!
//! Adjusts raw similarity scores with historical interaction signals:
//! click-through rate, recency, popularity, and exact-query selections.
//! The blend keeps semantic relevance dominant (0.7 base / 0.3 feedback) so
//! feedback can reorder near-ties but never bury a strong semantic match.

use chrono::{Duration, Utc};
use moka::sync::Cache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{debug, warn};

use kpath_domain::ports::FeedbackStore;
use kpath_domain::value_objects::FeedbackAggregate;

use crate::composer::query_hash;

/// Weight of each feedback sub-signal in the combined feedback score
#[derive(Debug, Clone, Copy)]
pub struct RankerWeights {
    pub click: f32,
    pub recency: f32,
    pub popularity: f32,
    pub query_match: f32,
}

impl Default for RankerWeights {
    fn default() -> Self {
        Self {
            click: 0.3,
            recency: 0.2,
            popularity: 0.1,
            query_match: 0.4,
        }
    }
}

/// Weight of the base similarity score in the final blend
const BASE_WEIGHT: f32 = 0.7;
/// Weight of the feedback score in the final blend
const FEEDBACK_WEIGHT: f32 = 0.3;
/// CTR window
const CTR_WINDOW_DAYS: i64 = 30;
/// Feedback-score cache TTL
const CACHE_TTL_SECS: u64 = 300;
/// Feedback-score cache capacity
const CACHE_CAPACITY: u64 = 1_000;

/// Cached feedback scores for one (query, candidate set) pair
struct ScoredSet {
    service_ids: Vec<i32>,
    scores: HashMap<i32, f32>,
}

/// Re-ranks `(service_id, base_score)` lists with feedback signals
pub struct FeedbackRanker {
    store: Arc<dyn FeedbackStore>,
    weights: RankerWeights,
    cache: Cache<String, Arc<ScoredSet>>,
}

impl FeedbackRanker {
    /// Create a ranker with default weights
    pub fn new(store: Arc<dyn FeedbackStore>) -> Self {
        Self::with_weights(store, RankerWeights::default())
    }

    /// Create a ranker with explicit weights
    pub fn with_weights(store: Arc<dyn FeedbackStore>, weights: RankerWeights) -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(StdDuration::from_secs(CACHE_TTL_SECS))
            .support_invalidation_closures()
            .build();
        Self {
            store,
            weights,
            cache,
        }
    }

    /// Apply feedback re-ranking to raw similarity results
    ///
    /// Returns the list re-sorted by the blended score, descending. A
    /// feedback-store failure degrades to the unmodified input; search
    /// stays up even when feedback reads are down.
    pub async fn rerank(&self, results: &[(i32, f32)], query: &str) -> Vec<(i32, f32)> {
        if results.is_empty() {
            return Vec::new();
        }

        let service_ids: Vec<i32> = results.iter().map(|(id, _)| *id).collect();
        let scores = match self.feedback_component(&service_ids, query).await {
            Ok(scores) => scores,
            Err(e) => {
                warn!("Feedback scoring unavailable, keeping base ranking: {}", e);
                return results.to_vec();
            }
        };

        let mut adjusted: Vec<(i32, f32)> = results
            .iter()
            .map(|(service_id, base)| {
                let feedback = scores.get(service_id).copied().unwrap_or(0.0);
                (*service_id, blend(*base, feedback))
            })
            .collect();
        adjusted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        adjusted
    }

    /// Feedback score per candidate service, in [0, 1]
    ///
    /// Exposed for callers that blend per-record instead of re-sorting a
    /// flat id list (the mixed agents-and-tools mode).
    pub async fn feedback_component(
        &self,
        service_ids: &[i32],
        query: &str,
    ) -> kpath_domain::Result<HashMap<i32, f32>> {
        let set = self.feedback_scores(service_ids, query).await?;
        Ok(set.scores.clone())
    }

    /// Combined feedback score per service, served from the short cache
    /// when the same (query, candidate set) repeats
    async fn feedback_scores(
        &self,
        service_ids: &[i32],
        query: &str,
    ) -> kpath_domain::Result<Arc<ScoredSet>> {
        let key = cache_key(service_ids, query);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let scores = self.compute_scores(service_ids, query).await?;
        let entry = Arc::new(ScoredSet {
            service_ids: service_ids.to_vec(),
            scores,
        });
        self.cache.insert(key, Arc::clone(&entry));
        Ok(entry)
    }

    async fn compute_scores(
        &self,
        service_ids: &[i32],
        query: &str,
    ) -> kpath_domain::Result<HashMap<i32, f32>> {
        let aggregates = self
            .store
            .feedback_aggregates(service_ids, Duration::days(CTR_WINDOW_DAYS))
            .await?;
        let query_matches = self
            .store
            .query_hash_matches(&query_hash(query), service_ids)
            .await?;

        let ctr = normalized_ctr(&aggregates);
        let popularity = normalized_popularity(&aggregates);
        let query_score = normalized_counts(&query_matches);

        let now = Utc::now();
        let mut scores = HashMap::with_capacity(service_ids.len());
        for service_id in service_ids {
            let recency = aggregates
                .get(service_id)
                .and_then(|a| a.last_interaction)
                .map(|last| recency_bucket((now - last).num_days()))
                .unwrap_or(0.0);

            let combined = self.weights.click * ctr.get(service_id).copied().unwrap_or(0.0)
                + self.weights.recency * recency
                + self.weights.popularity * popularity.get(service_id).copied().unwrap_or(0.0)
                + self.weights.query_match * query_score.get(service_id).copied().unwrap_or(0.0);

            scores.insert(*service_id, combined.clamp(0.0, 1.0));
        }

        debug!(
            candidates = service_ids.len(),
            scored = scores.values().filter(|s| **s > 0.0).count(),
            "Computed feedback scores"
        );
        Ok(scores)
    }

    /// Drop cached scores that involve the given service
    ///
    /// Called after a feedback write so the next query observes it. The
    /// cache is pure optimization; dropping entries is always safe.
    pub fn invalidate_service(&self, service_id: i32) {
        let _ = self
            .cache
            .invalidate_entries_if(move |_, entry| entry.service_ids.contains(&service_id));
    }
}

/// Blend a base similarity score with a feedback score
pub fn blend(base: f32, feedback: f32) -> f32 {
    BASE_WEIGHT * base + FEEDBACK_WEIGHT * feedback
}

fn cache_key(service_ids: &[i32], query: &str) -> String {
    let mut sorted = service_ids.to_vec();
    sorted.sort_unstable();
    let ids: Vec<String> = sorted.iter().map(|id| id.to_string()).collect();
    format!("{}|{}", query_hash(query), ids.join(","))
}

/// Days-since-last-interaction buckets
fn recency_bucket(days_ago: i64) -> f32 {
    if days_ago <= 1 {
        1.0
    } else if days_ago <= 7 {
        0.8
    } else if days_ago <= 30 {
        0.5
    } else {
        0.2
    }
}

/// Windowed CTR per service, normalized by the max CTR in the set
fn normalized_ctr(aggregates: &HashMap<i32, FeedbackAggregate>) -> HashMap<i32, f32> {
    let mut raw: HashMap<i32, f32> = HashMap::new();
    let mut max_ctr: f32 = 0.0;
    for (service_id, aggregate) in aggregates {
        if aggregate.impressions > 0 {
            let ctr = aggregate.clicks as f32 / aggregate.impressions as f32;
            raw.insert(*service_id, ctr);
            max_ctr = max_ctr.max(ctr);
        }
    }
    if max_ctr > 0.0 {
        for value in raw.values_mut() {
            *value /= max_ctr;
        }
    }
    raw
}

/// Total interactions on a log scale, normalized by the max in the set
fn normalized_popularity(aggregates: &HashMap<i32, FeedbackAggregate>) -> HashMap<i32, f32> {
    let max_count = aggregates
        .values()
        .map(|a| a.total_interactions)
        .max()
        .unwrap_or(0);
    if max_count == 0 {
        return HashMap::new();
    }
    let max_log = (max_count as f32).ln_1p();
    aggregates
        .iter()
        .filter(|(_, a)| a.total_interactions > 0)
        .map(|(service_id, a)| {
            (*service_id, (a.total_interactions as f32).ln_1p() / max_log)
        })
        .collect()
}

/// Exact-query selection counts, normalized by the max in the set
fn normalized_counts(counts: &HashMap<i32, u64>) -> HashMap<i32, f32> {
    let max_count = counts.values().copied().max().unwrap_or(0);
    if max_count == 0 {
        return HashMap::new();
    }
    counts
        .iter()
        .map(|(service_id, count)| (*service_id, *count as f32 / max_count as f32))
        .collect()
}
