use std::sync::Arc;
use std::time::Duration;
use crate::error::{Error, Result, SourceError};
use crate::events::quote::{Quote, SourceTag};
use crate::observability::metrics::{NO_PRICE_AVAILABLE, RESOLUTIONS};
use crate::price_infra::cache::{CacheLookup, PriceCache};
use crate::price_infra::connectors::{fetch_with_timeout, PriceSource};
use crate::types::symbol::Symbol;

/// Live sources in priority order, each bounded by the same timeout, with
/// write-through into the cache.
pub struct SourceChain {
    sources: Vec<Arc<dyn PriceSource>>,
    timeout: Duration,
    cache: Arc<PriceCache>,
}

impl SourceChain {
    pub fn new(sources: Vec<Arc<dyn PriceSource>>, timeout: Duration, cache: Arc<PriceCache>) -> Self {
        SourceChain {
            sources,
            timeout,
            cache,
        }
    }

    /// First source to answer wins and is written to the cache. Returns the
    /// last failure when every source fails.
    pub async fn fetch_and_store(&self, symbol: &Symbol) -> std::result::Result<Quote, SourceError> {
        let mut last_error = SourceError::Empty;

        for source in &self.sources {
            match fetch_with_timeout(source.as_ref(), symbol, self.timeout).await {
                Ok(quote) => {
                    let quote = if quote.source == source.tag() {
                        quote
                    } else {
                        quote.with_source(source.tag())
                    };
                    self.cache.put(quote.clone());
                    RESOLUTIONS.with_label_values(&[source.tag().as_str()]).inc();
                    tracing::debug!("{} resolved by {}: {}", symbol, source.name(), quote.price);
                    return Ok(quote);
                }
                Err(e) => {
                    tracing::warn!("{} failed for {}: {}", source.name(), symbol, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    /// `fetch_and_store` for callers that speak the crate-level error.
    pub async fn fetch_live(&self, symbol: &Symbol) -> Result<Quote> {
        Ok(self.fetch_and_store(symbol).await?)
    }

    /// What is left once the live sources failed with `cause`: any cache
    /// entry within the staleness bound (re-tagged `stale-cache`), otherwise
    /// `NoPriceAvailable`.
    pub fn stale_or_unavailable(&self, symbol: &Symbol, cause: &Error) -> Result<Quote> {
        match self.cache.get(symbol) {
            CacheLookup::Fresh(quote) => Ok(quote),
            CacheLookup::Stale { quote, age } => {
                tracing::warn!(
                    "Serving stale cache for {} (age {:?}) after live sources failed: {}",
                    symbol, age, cause
                );
                RESOLUTIONS.with_label_values(&[SourceTag::StaleCache.as_str()]).inc();
                Ok(quote.with_source(SourceTag::StaleCache))
            }
            CacheLookup::Miss => {
                tracing::error!("No price available for {}: {}", symbol, cause);
                NO_PRICE_AVAILABLE.inc();
                Err(Error::NoPriceAvailable(symbol.clone()))
            }
        }
    }
}
