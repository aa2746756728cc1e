//! Port contracts implemented by outer-layer providers

mod catalog;
mod embedding;

pub use catalog::{
    AuthStore, CatalogReader, FeedbackStore, PopularQuery, ServiceFeedbackStats,
};
pub use embedding::EmbeddingProvider;
