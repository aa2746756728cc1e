//! Configuration
//!
//! Layered configuration: defaults, then an optional `kpath.toml`, then
//! `KPATH_`-prefixed environment variables. All sections validate at
//! startup so a misconfigured deployment fails before it binds a port.

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{
    AppConfig, AuthConfig, DatabaseConfig, LoggingConfig, SearchConfig, ServerConfig,
};
