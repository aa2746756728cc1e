//! KPATH Enterprise HTTP surface
//!
//! Stateless request handling over the search core: authentication (bearer
//! JWT, API key header, API key query parameter), per-key hourly rate
//! limiting, request validation, dispatch to the query planner, and
//! translation of domain errors to HTTP status codes in one place.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod models;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
