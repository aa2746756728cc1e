//! KPATH Enterprise infrastructure layer
//!
//! Cross-cutting technical concerns: layered configuration loading and
//! structured logging setup.

pub mod config;
pub mod logging;

pub use config::{AppConfig, ConfigLoader};
