//! Catalog entities
//!
//! Read-side projections of the relational catalog: services with their
//! capabilities and connectivity contracts, the tools they expose, and the
//! append-only feedback/request records used by ranking and rate limiting.

mod feedback;
mod principal;
mod service;
mod tool;

pub use feedback::{FeedbackEvent, NewFeedbackEvent, RequestLogEntry, SearchLogEntry};
pub use principal::{ApiKeyRecord, AuthMethod, Principal, UserRecord, SCOPE_ADMIN, SCOPE_SEARCH};
pub use service::{AgentProtocol, Capability, IntegrationDetails, Service, ServiceStatus};
pub use tool::Tool;
