//! Logging setup
//!
//! Installs a global `tracing` subscriber. `RUST_LOG` takes precedence over
//! the configured level so a deployed build can be made chatty without a
//! config change.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bluccino_core::{BlError, BlResult};

use crate::LoggingConfig;

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> BlResult<()> {
    let filter = env_filter(config)?;

    if config.json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(config.with_target)
            .with_thread_ids(true);
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
            .map_err(|e| BlError::Logging(e.to_string()))?;
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(config.with_target)
            .with_thread_ids(false);
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
            .map_err(|e| BlError::Logging(e.to_string()))?;
    }

    tracing::debug!(level = %config.level, json = config.json, "logging initialized");
    Ok(())
}

fn env_filter(config: &LoggingConfig) -> BlResult<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| BlError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig {
            level: "warn".into(),
            ..LoggingConfig::default()
        };
        // Another test may have installed a subscriber first; either way the
        // later call must report an error instead of panicking
        let first = init_logging(&config);
        let second = init_logging(&config);
        assert!(first.is_ok() || matches!(first, Err(BlError::Logging(_))));
        assert!(matches!(second, Err(BlError::Logging(_))));
    }
}
