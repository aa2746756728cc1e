//! KPATH Enterprise provider implementations
//!
//! Adapters behind the domain ports: embedding generation (local ONNX
//! models, a statistical fallback, a deterministic test provider) and
//! catalog access (Postgres for production, in-memory for tests and
//! development).

pub mod catalog;
pub mod embedding;
