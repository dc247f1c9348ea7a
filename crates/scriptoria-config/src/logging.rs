//! Tracing subscriber initialisation

use tracing_subscriber::EnvFilter;

use crate::{
    error::{ConfigError, Result},
    types::LoggingConfig,
};

/// Install a global fmt subscriber configured from `config`.
///
/// `RUST_LOG` takes precedence over `config.level`. Installing twice returns
/// [`ConfigError::Logging`] rather than panicking, so tests can call this
/// freely.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| ConfigError::Logging(format!("Invalid log level {:?}: {}", config.level, e)))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))
}
