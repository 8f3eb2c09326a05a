//! Log output setup.
//!
//! The engine only emits `tracing` events; installing a subscriber is left
//! to the embedding application, which can use [`init_tracing`].

use crate::config::LogConfig;
use crate::errors::ConfigError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable overriding the configured filter.
pub const FILTER_ENV: &str = "RUST_LOG";

/// Installs the global subscriber described by `config`.
///
/// A non-empty `RUST_LOG` takes precedence over `config.level`. If a global
/// subscriber is already installed this does nothing.
pub fn init_tracing(config: &LogConfig) -> Result<(), ConfigError> {
    let directives = match std::env::var(FILTER_ENV) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => config.level.clone(),
    };
    let layer = layer(config, parse_filter(&directives)?);

    // Fails only if a subscriber is already set.
    let _ = tracing_subscriber::registry().with(layer).try_init();
    Ok(())
}

/// Parses filter directives such as `info` or `ackflow=debug,warn`.
pub fn parse_filter(directives: &str) -> Result<EnvFilter, ConfigError> {
    EnvFilter::try_new(directives)
        .map_err(|e| ConfigError::new(format!("invalid log filter '{directives}': {e}")))
}

fn layer(config: &LogConfig, filter: EnvFilter) -> Box<dyn Layer<Registry> + Send + Sync> {
    if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false)
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(filter)
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter() {
        assert!(parse_filter("info").is_ok());
        assert!(parse_filter("ackflow=debug,warn").is_ok());
        assert!(parse_filter("ackflow=loud").is_err());
    }

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        let config = LogConfig::default().with_json(true);
        init_tracing(&config).unwrap();
        init_tracing(&LogConfig::default()).unwrap();
        tracing::info!("subscriber installed");
    }
}
