//! KPATH Enterprise domain layer
//!
//! Core business types for the capability discovery service: catalog
//! entities, search value objects, the shared error type, and the port
//! traits implemented by providers in outer layers.
//!
//! This crate has no I/O and no async runtime dependency beyond the
//! `async_trait` port definitions.

pub mod entities;
pub mod error;
pub mod ports;
pub mod value_objects;

pub use error::{Error, Result};
