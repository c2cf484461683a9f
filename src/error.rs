use std::time::Duration;
use thiserror::Error;
use crate::types::symbol::Symbol;

/// Failure of a single source adapter call. Always recovered by the resolver
/// falling through to the next tier.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("{source_name} timed out after {after:?}")]
    Timeout {
        source_name: String,
        after: Duration,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Empty response")]
    Empty,

    #[error("Unsupported symbol: {0}")]
    UnsupportedSymbol(Symbol),

    #[error("Upstream status {code}: {message}")]
    Status {
        code: i64,
        message: String,
    },

    #[error("Invalid price: {0}")]
    InvalidPrice(String),
}

impl SourceError {
    /// Label used for the `kind` dimension of failure metrics
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Timeout { .. } => "timeout",
            SourceError::UnsupportedSymbol(_) => "unsupported",
            _ => "error",
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::Malformed(e.to_string())
        } else {
            SourceError::Transport(e.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Resolution Errors
    #[error("No price available for {0}")]
    NoPriceAvailable(Symbol),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    // Feed Errors
    #[error("Feed not connected")]
    NotConnected,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Channel closed")]
    ChannelClosed,

    // Lifecycle Errors
    #[error("Service not started")]
    NotStarted,

    #[error("Service already started")]
    AlreadyStarted,

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    // System Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<prometheus::Error> for Error {
    fn from(e: prometheus::Error) -> Self {
        Error::MetricsError(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::ConfigError(e.to_string())
    }
}
