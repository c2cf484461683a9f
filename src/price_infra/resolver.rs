use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use crate::config::{CacheConfig, ResolverConfig};
use crate::error::Result;
use crate::events::quote::Quote;
use crate::observability::metrics::RESOLUTIONS;
use crate::observability::tracing::trace_resolution;
use crate::price_infra::cache::{CacheLookup, PriceCache};
use crate::price_infra::chain::SourceChain;
use crate::price_infra::dedup::RequestDeduplicator;
use crate::price_infra::refresher::BackgroundRefresher;
use crate::types::price::Price;
use crate::types::symbol::Symbol;

/// Assets priced at a fixed value without any I/O.
#[derive(Clone, Debug)]
pub struct StableSet {
    symbols: HashSet<Symbol>,
    price: Price,
}

impl StableSet {
    pub fn new(symbols: impl IntoIterator<Item = Symbol>, price: Price) -> Self {
        StableSet {
            symbols: symbols.into_iter().collect(),
            price,
        }
    }

    /// Unparseable entries are skipped with a warning.
    pub fn from_config(config: &ResolverConfig) -> Result<Self> {
        let symbols = config.stable_symbols.iter().filter_map(|raw| match Symbol::parse(raw) {
            Ok(symbol) => Some(symbol),
            Err(e) => {
                tracing::warn!("Ignoring stable symbol {:?}: {}", raw, e);
                None
            }
        });
        Ok(Self::new(symbols, Price::from_f64(config.stable_price)?))
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.symbols.contains(symbol)
    }

    pub fn quote(&self, symbol: &Symbol) -> Option<Quote> {
        self.contains(symbol).then(|| Quote::stable(symbol.clone(), self.price))
    }
}

/// Tiered price resolution:
///
/// 1. fixed-price stable assets
/// 2. fresh cache
/// 3. stale cache inside the serve window, with a background refresh
/// 4. primary source
/// 5. secondary source
/// 6. any cache entry within the staleness bound, tagged `stale-cache`
/// 7. `NoPriceAvailable`
///
/// Tiers 4-5 run behind the deduplicator so concurrent callers for one
/// symbol share a single upstream round; each caller then applies 6-7 to
/// the shared outcome.
pub struct FallbackResolver {
    stable: StableSet,
    cache: Arc<PriceCache>,
    chain: Arc<SourceChain>,
    dedup: Arc<RequestDeduplicator>,
    refresher: BackgroundRefresher,
    stale_serve_window: Duration,
}

impl FallbackResolver {
    pub fn new(
        stable: StableSet,
        cache: Arc<PriceCache>,
        chain: Arc<SourceChain>,
        dedup: Arc<RequestDeduplicator>,
        cache_config: &CacheConfig,
    ) -> Self {
        let refresher = BackgroundRefresher::new(Arc::clone(&chain), Arc::clone(&dedup));
        FallbackResolver {
            stable,
            cache,
            chain,
            dedup,
            refresher,
            stale_serve_window: cache_config.stale_serve_window(),
        }
    }

    pub fn stable(&self) -> &StableSet {
        &self.stable
    }

    pub fn cache(&self) -> &Arc<PriceCache> {
        &self.cache
    }

    pub fn refresher(&self) -> &BackgroundRefresher {
        &self.refresher
    }

    pub fn dedup(&self) -> &Arc<RequestDeduplicator> {
        &self.dedup
    }

    pub async fn resolve_price(&self, symbol: &Symbol) -> Result<Quote> {
        if let Some(quote) = self.stable.quote(symbol) {
            RESOLUTIONS.with_label_values(&["stable"]).inc();
            return Ok(quote);
        }

        match self.cache.get(symbol) {
            CacheLookup::Fresh(quote) => {
                RESOLUTIONS.with_label_values(&["fresh"]).inc();
                return Ok(quote);
            }
            CacheLookup::Stale { quote, age } if age <= self.cache.ttl() + self.stale_serve_window => {
                tracing::debug!("Serving stale {} (age {:?}), refreshing in background", symbol, age);
                RESOLUTIONS.with_label_values(&["stale_serve"]).inc();
                self.refresher.refresh_async(symbol);
                return Ok(quote);
            }
            _ => {}
        }

        let chain = Arc::clone(&self.chain);
        let owned = symbol.clone();
        let live = self.dedup
            .resolve(symbol, move || async move { chain.fetch_live(&owned).await })
            .instrument(trace_resolution(symbol))
            .await;

        match live {
            Ok(quote) => Ok(quote),
            Err(e) => self.chain.stale_or_unavailable(symbol, &e),
        }
    }

    /// Parses `raw` and resolves it.
    pub async fn resolve_str(&self, raw: &str) -> Result<Quote> {
        let symbol = Symbol::parse(raw)?;
        self.resolve_price(&symbol).await
    }
}

