//! API request/response models
//!
//! Request bodies are strict: unknown fields are rejected so a typo in a
//! field name fails loudly instead of being ignored. Responses tolerate
//! growth; consumers must ignore fields they do not know.

use serde::{Deserialize, Serialize};
use validator::Validate;

use kpath_domain::error::{Error, Result};
use kpath_domain::value_objects::{SearchMode, SearchRequest};

/// POST /search body
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SearchRequestDto {
    #[validate(length(min = 1, message = "query must not be empty"))]
    pub query: String,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    pub limit: usize,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0, message = "min_score must be between 0 and 1"))]
    pub min_score: f32,
    #[serde(default)]
    pub domains: Option<Vec<String>>,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
    #[serde(default)]
    pub include_orchestration: bool,
    #[serde(default)]
    pub search_mode: SearchMode,
}

fn default_limit() -> usize {
    10
}

impl SearchRequestDto {
    /// Validate and convert into the planner's request type
    pub fn into_domain(self) -> Result<SearchRequest> {
        self.validate()
            .map_err(|e| Error::validation(flatten_validation_errors(&e)))?;
        if self.query.trim().is_empty() {
            return Err(Error::validation("query must not be empty"));
        }
        Ok(SearchRequest {
            query: self.query.trim().to_string(),
            limit: self.limit,
            min_score: self.min_score,
            domains: self.domains,
            capabilities: self.capabilities,
            include_orchestration: self.include_orchestration,
            search_mode: self.search_mode,
        })
    }
}

/// GET /search query parameters; list fields repeat the parameter name
#[derive(Debug, Clone, Deserialize)]
pub struct SearchQueryParams {
    pub query: Option<String>,
    pub limit: Option<usize>,
    pub min_score: Option<f32>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub include_orchestration: Option<bool>,
    pub search_mode: Option<String>,
    /// Consumed by authentication; present here so strict decoding of the
    /// remaining parameters still accepts it
    #[allow(dead_code)]
    pub api_key: Option<String>,
}

impl SearchQueryParams {
    pub fn into_dto(self) -> Result<SearchRequestDto> {
        let search_mode = match self.search_mode.as_deref() {
            None => SearchMode::default(),
            Some(raw) => parse_search_mode(raw)?,
        };
        Ok(SearchRequestDto {
            query: self
                .query
                .ok_or_else(|| Error::validation("query parameter is required"))?,
            limit: self.limit.unwrap_or_else(default_limit),
            min_score: self.min_score.unwrap_or(0.0),
            domains: (!self.domains.is_empty()).then_some(self.domains),
            capabilities: (!self.capabilities.is_empty()).then_some(self.capabilities),
            include_orchestration: self.include_orchestration.unwrap_or(false),
            search_mode,
        })
    }
}

fn parse_search_mode(raw: &str) -> Result<SearchMode> {
    match raw {
        "agents_only" => Ok(SearchMode::AgentsOnly),
        "tools_only" => Ok(SearchMode::ToolsOnly),
        "agents_and_tools" => Ok(SearchMode::AgentsAndTools),
        "workflows" => Ok(SearchMode::Workflows),
        "capabilities" => Ok(SearchMode::Capabilities),
        other => Err(Error::validation(format!(
            "Unknown search_mode '{}'",
            other
        ))),
    }
}

/// Reaction kinds accepted by the feedback endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Click,
    Select,
    Relevant,
    NotRelevant,
}

impl FeedbackType {
    /// Whether this reaction counts as a click-through
    pub fn is_click_through(self) -> bool {
        matches!(self, FeedbackType::Click | FeedbackType::Select)
    }
}

/// POST /search/feedback body
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct FeedbackRequestDto {
    #[validate(length(min = 1, message = "query must not be empty"))]
    pub query: String,
    pub service_id: i32,
    #[validate(range(min = 1, message = "rank must be at least 1"))]
    pub rank: i32,
    pub feedback_type: FeedbackType,
    #[validate(range(min = 0.0, max = 5.0, message = "score must be between 0 and 5"))]
    pub score: Option<f32>,
}

/// GET /search/feedback/stats parameters
#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackStatsParams {
    pub service_id: Option<i32>,
    pub limit: Option<usize>,
}

/// GET /search/feedback/queries parameters
#[derive(Debug, Clone, Deserialize)]
pub struct PopularQueriesParams {
    pub limit: Option<usize>,
}

/// GET /search/similar/{service_id} parameters
#[derive(Debug, Clone, Deserialize)]
pub struct SimilarParams {
    pub limit: Option<usize>,
    pub min_score: Option<f32>,
}

/// Collapse validator output into one field-prefixed message line
pub fn flatten_validation_errors(errors: &validator::ValidationErrors) -> String {
    let mut parts: Vec<String> = Vec::new();
    for (field, field_errors) in errors.field_errors() {
        for error in field_errors {
            let message = error
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| error.code.to_string());
            parts.push(format!("{}: {}", field, message));
        }
    }
    parts.sort();
    parts.join("; ")
}
