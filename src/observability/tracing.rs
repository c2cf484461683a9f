use tracing::Span;
use tracing_subscriber::EnvFilter;
use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use crate::types::symbol::Symbol;

/// Installs the global subscriber. `RUST_LOG` overrides the configured filter.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| Error::ConfigError(format!("invalid log filter: {}", e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| Error::ConfigError(format!("tracing already initialised: {}", e)))
}

pub fn trace_resolution(symbol: &Symbol) -> Span {
    tracing::info_span!(
        "price_resolution",
        symbol = %symbol,
    )
}

pub fn trace_refresh(symbol: &Symbol) -> Span {
    tracing::debug_span!(
        "background_refresh",
        symbol = %symbol,
    )
}

pub fn trace_batch(size: usize) -> Span {
    tracing::info_span!(
        "price_batch",
        size,
    )
}
