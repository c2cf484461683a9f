use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::Instrument;
use crate::config::BatchConfig;
use crate::events::quote::Quote;
use crate::observability::tracing::trace_batch;
use crate::price_infra::rate_limiter::RateLimiter;
use crate::price_infra::resolver::FallbackResolver;
use crate::types::symbol::Symbol;

/// Best-effort multi-symbol resolution. Stable assets are answered inline;
/// the rest go through the resolver in sequential chunks, concurrently
/// within each chunk. Failed symbols are left out of the result.
pub struct BatchFetcher {
    resolver: Arc<FallbackResolver>,
    chunk_size: usize,
    limiter: RateLimiter,
}

impl BatchFetcher {
    pub fn new(resolver: Arc<FallbackResolver>, config: &BatchConfig) -> Self {
        BatchFetcher {
            resolver,
            chunk_size: config.chunk_size.max(1),
            limiter: RateLimiter::per_second(config.rate_limit_per_sec),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub async fn resolve_batch<I>(&self, symbols: I) -> HashMap<Symbol, Quote>
    where
        I: IntoIterator<Item = Symbol>,
    {
        let mut seen = HashSet::new();
        let unique: Vec<Symbol> = symbols.into_iter()
            .filter(|s| seen.insert(s.clone()))
            .collect();

        let span = trace_batch(unique.len());
        self.resolve_unique(unique).instrument(span).await
    }

    async fn resolve_unique(&self, symbols: Vec<Symbol>) -> HashMap<Symbol, Quote> {
        let mut resolved = HashMap::with_capacity(symbols.len());

        let (stable, pending): (Vec<Symbol>, Vec<Symbol>) = symbols.into_iter()
            .partition(|s| self.resolver.stable().contains(s));

        for symbol in stable {
            if let Some(quote) = self.resolver.stable().quote(&symbol) {
                resolved.insert(symbol, quote);
            }
        }

        for (index, chunk) in pending.chunks(self.chunk_size).enumerate() {
            self.limiter.acquire(chunk.len()).await;
            tracing::debug!("Resolving chunk {} ({} symbols)", index, chunk.len());

            let outcomes = join_all(chunk.iter().map(|s| self.resolver.resolve_price(s))).await;

            for (symbol, outcome) in chunk.iter().zip(outcomes) {
                match outcome {
                    Ok(quote) => {
                        resolved.insert(symbol.clone(), quote);
                    }
                    Err(e) => tracing::warn!("Omitting {} from batch: {}", symbol, e),
                }
            }
        }

        resolved
    }
}
