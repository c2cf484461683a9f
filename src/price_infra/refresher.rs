use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;
use crate::error::Result;
use crate::events::quote::Quote;
use crate::observability::tracing::trace_refresh;
use crate::price_infra::chain::SourceChain;
use crate::price_infra::dedup::RequestDeduplicator;
use crate::types::symbol::Symbol;

/// Fire-and-forget cache repopulation for quotes served stale.
pub struct BackgroundRefresher {
    chain: Arc<SourceChain>,
    dedup: Arc<RequestDeduplicator>,
}

impl BackgroundRefresher {
    pub fn new(chain: Arc<SourceChain>, dedup: Arc<RequestDeduplicator>) -> Self {
        BackgroundRefresher {
            chain,
            dedup,
        }
    }

    /// Spawns a refresh against the live sources unless one is already
    /// running for `symbol`. A failure leaves the cache untouched and is only
    /// logged; the resolver never awaits the handle.
    pub fn refresh_async(&self, symbol: &Symbol) -> Option<JoinHandle<Result<Quote>>> {
        if self.dedup.is_in_flight(symbol) {
            tracing::trace!("Refresh for {} already in flight", symbol);
            return None;
        }

        let chain = Arc::clone(&self.chain);
        let dedup = Arc::clone(&self.dedup);
        let owned = symbol.clone();
        let span = trace_refresh(symbol);

        let handle = tokio::spawn(async move {
            let fetch_symbol = owned.clone();
            let outcome = dedup
                .resolve(&owned, move || async move { chain.fetch_live(&fetch_symbol).await })
                .await;

            match &outcome {
                Ok(quote) => {
                    tracing::debug!("Background refresh for {} stored {} from {}", owned, quote.price, quote.source);
                }
                Err(e) => {
                    tracing::warn!("Background refresh for {} failed, keeping cached quote: {}", owned, e);
                }
            }
            outcome
        }.instrument(span));

        Some(handle)
    }
}
