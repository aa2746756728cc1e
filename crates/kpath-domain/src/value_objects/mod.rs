//! Value objects shared across layers

mod embedding;
mod search;

pub use embedding::Embedding;
pub use search::{
    EntityType, FeedbackAggregate, RecommendedTool, SearchMode, SearchRecord, SearchRequest,
    SearchResponse, ServiceView, ToolView, WorkflowData, WorkflowPattern,
};
