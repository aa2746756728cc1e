//! Structured logging with tracing
//!
//! Configures the tracing subscriber from [`LoggingConfig`]: env-filterable
//! level (`KPATH_LOG`), optional JSON output, optional daily-rolling file.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use kpath_domain::error::{Error, Result};

pub use crate::config::LoggingConfig;

/// Initialize logging; call once at process startup
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_env("KPATH_LOG").unwrap_or_else(|_| EnvFilter::new(&config.level));
    let file_appender = config.file_output.as_ref().map(|path| {
        tracing_appender::rolling::daily(
            path.parent().unwrap_or_else(|| std::path::Path::new(".")),
            path.file_stem()
                .unwrap_or_else(|| std::ffi::OsStr::new("kpath")),
        )
    });

    let registry = Registry::default().with(filter);
    let result = if config.json_format {
        let stdout = fmt::layer().json().with_target(true);
        match file_appender {
            Some(appender) => {
                let file = fmt::layer().json().with_writer(appender).with_ansi(false);
                registry.with(stdout).with(file).try_init()
            }
            None => registry.with(stdout).try_init(),
        }
    } else {
        let stdout = fmt::layer().with_target(true);
        match file_appender {
            Some(appender) => {
                let file = fmt::layer().with_writer(appender).with_ansi(false);
                registry.with(stdout).with(file).try_init()
            }
            None => registry.with(stdout).try_init(),
        }
    };

    result.map_err(|e| Error::configuration_with_source("Failed to initialize logging", e))
}
