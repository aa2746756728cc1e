//! Configuration loader
//!
//! Merges configuration sources with figment; later sources override
//! earlier ones: defaults → TOML file → environment.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use std::env;
use std::path::{Path, PathBuf};
use tracing::info;

use kpath_domain::error::{Error, Result};

use crate::config::AppConfig;

/// Environment variable prefix (e.g. `KPATH_SERVER_PORT`)
const ENV_PREFIX: &str = "KPATH";
/// Default configuration file name
const CONFIG_FILENAME: &str = "kpath.toml";
/// Directory name used under the user config dir
const CONFIG_DIR: &str = "kpath";

/// Configuration loader service
#[derive(Clone, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit configuration file path
    pub fn with_config_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration from all sources
    pub fn load(&self) -> Result<AppConfig> {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));

        let file = self
            .config_path
            .clone()
            .or_else(Self::find_default_config_path);
        if let Some(path) = file {
            if path.exists() {
                info!(path = %path.display(), "Loading configuration file");
                figment = figment.merge(Toml::file(path));
            } else if self.config_path.is_some() {
                return Err(Error::configuration(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
        }

        figment = figment.merge(Env::prefixed(&format!("{}_", ENV_PREFIX)).split("_"));

        let config: AppConfig = figment
            .extract()
            .map_err(|e| Error::configuration_with_source("Failed to parse configuration", e))?;

        validate(&config)?;
        Ok(config)
    }

    fn find_default_config_path() -> Option<PathBuf> {
        let current_dir = env::current_dir().ok()?;
        let candidates = [
            Some(current_dir.join(CONFIG_FILENAME)),
            Some(current_dir.join("config").join(CONFIG_FILENAME)),
            dirs::config_dir().map(|d| d.join(CONFIG_DIR).join(CONFIG_FILENAME)),
        ];
        candidates.into_iter().flatten().find(|path| path.exists())
    }
}

fn validate(config: &AppConfig) -> Result<()> {
    if config.server.port == 0 {
        return Err(Error::configuration("server.port must be non-zero"));
    }
    if config.server.request_timeout_secs == 0 {
        return Err(Error::configuration(
            "server.request_timeout_secs must be at least 1",
        ));
    }
    if config.database.pool_size == 0 {
        return Err(Error::configuration("database.pool_size must be at least 1"));
    }
    if config.search.embedding_dimension == 0 {
        return Err(Error::configuration(
            "search.embedding_dimension must be at least 1",
        ));
    }
    if config.search.default_rate_limit == 0 {
        return Err(Error::configuration(
            "search.default_rate_limit must be at least 1",
        ));
    }
    if !config.database.url.is_empty() && config.auth.jwt_secret.is_empty() {
        return Err(Error::configuration(
            "auth.jwt_secret is required when a database is configured",
        ));
    }
    Ok(())
}
