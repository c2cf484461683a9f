pub mod primary;
pub mod secondary;

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use crate::error::SourceError;
use crate::events::quote::{Quote, SourceTag};
use crate::observability::metrics::{SOURCE_FAILURES, SOURCE_LATENCY};
use crate::types::symbol::Symbol;

pub use primary::RestTickerSource;
pub use secondary::StreamSource;

/// One upstream price provider. Implementations hold no resolution state;
/// timeouts are applied by the caller through `fetch_with_timeout`.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn tag(&self) -> SourceTag;

    fn name(&self) -> &str;

    async fn fetch(&self, symbol: &Symbol) -> Result<Quote, SourceError>;
}

/// Runs `source.fetch` under `timeout`. Elapsing is reported as
/// `SourceError::Timeout`; latency and failures are recorded per source.
pub async fn fetch_with_timeout(
    source: &dyn PriceSource,
    symbol: &Symbol,
    timeout: Duration,
) -> Result<Quote, SourceError> {
    let started = Instant::now();

    let outcome = match tokio::time::timeout(timeout, source.fetch(symbol)).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout {
            source_name: source.name().to_string(),
            after: timeout,
        }),
    };

    SOURCE_LATENCY
        .with_label_values(&[source.name()])
        .observe(started.elapsed().as_secs_f64());

    if let Err(e) = &outcome {
        SOURCE_FAILURES.with_label_values(&[source.name(), e.kind()]).inc();
    }

    outcome
}

/// Parses an optional numeric string field, ignoring blanks.
pub(crate) fn parse_optional_f64(raw: Option<&str>) -> Option<f64> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}
