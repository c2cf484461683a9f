use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use crate::config::CacheConfig;
use crate::events::quote::Quote;
use crate::observability::metrics::CACHE_LOOKUPS;
use crate::types::symbol::Symbol;

/// Classification of a cached quote relative to now.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheLookup {
    Fresh(Quote),
    Stale { quote: Quote, age: Duration },
    Miss,
}

impl CacheLookup {
    fn outcome(&self) -> &'static str {
        match self {
            CacheLookup::Fresh(_) => "fresh",
            CacheLookup::Stale { .. } => "stale",
            CacheLookup::Miss => "miss",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub quote: Quote,
    pub stored_at: Instant,
}

impl CacheEntry {
    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stored_at)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub fresh: usize,
    pub stale: usize,
    pub expired: usize,
}

/// Symbol -> last good quote. Entries are overwritten, never evicted, so an
/// entry past its TTL stays available as a fallback until `clear`.
pub struct PriceCache {
    entries: DashMap<Symbol, CacheEntry>,
    ttl: Duration,
    max_staleness: Duration,
}

impl PriceCache {
    pub fn new(ttl: Duration, max_staleness: Duration) -> Self {
        PriceCache {
            entries: DashMap::new(),
            ttl,
            max_staleness: max_staleness.max(ttl),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl(), config.max_staleness())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_staleness(&self) -> Duration {
        self.max_staleness
    }

    pub fn get(&self, symbol: &Symbol) -> CacheLookup {
        let lookup = self.get_at(symbol, Instant::now());
        CACHE_LOOKUPS.with_label_values(&[lookup.outcome()]).inc();
        lookup
    }

    pub fn get_at(&self, symbol: &Symbol, now: Instant) -> CacheLookup {
        let Some(entry) = self.entries.get(symbol) else {
            return CacheLookup::Miss;
        };

        let age = entry.age_at(now);
        if age <= self.ttl {
            CacheLookup::Fresh(entry.quote.clone())
        } else if age <= self.max_staleness {
            CacheLookup::Stale { quote: entry.quote.clone(), age }
        } else {
            CacheLookup::Miss
        }
    }

    /// Overwrites the entry for `quote.symbol` and restarts its clock.
    pub fn put(&self, quote: Quote) {
        let entry = CacheEntry {
            quote,
            stored_at: Instant::now(),
        };
        self.entries.insert(entry.quote.symbol.clone(), entry);
    }

    /// Raw entry regardless of age.
    pub fn peek(&self, symbol: &Symbol) -> Option<CacheEntry> {
        self.entries.get(symbol).map(|e| e.value().clone())
    }

    pub fn clear(&self) {
        let dropped = self.entries.len();
        self.entries.clear();
        tracing::info!("Price cache cleared ({} entries dropped)", dropped);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let mut stats = CacheStats::default();
        for entry in self.entries.iter() {
            let age = entry.age_at(now);
            if age <= self.ttl {
                stats.fresh += 1;
            } else if age <= self.max_staleness {
                stats.stale += 1;
            } else {
                stats.expired += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::quote::SourceTag;
    use crate::types::price::Price;

    fn quote(symbol: &str, price: f64) -> Quote {
        Quote::new(
            Symbol::parse(symbol).unwrap(),
            Price::from_f64(price).unwrap(),
            SourceTag::Primary,
        )
    }

    fn cache() -> PriceCache {
        PriceCache::new(Duration::from_secs(60), Duration::from_secs(3600))
    }

    #[tokio::test(start_paused = true)]
    async fn classifies_by_age() {
        let cache = cache();
        let btc = Symbol::parse("BTC").unwrap();
        cache.put(quote("BTC", 65_000.0));
        let stored = cache.peek(&btc).unwrap().stored_at;

        assert!(matches!(cache.get_at(&btc, stored + Duration::from_secs(59)), CacheLookup::Fresh(_)));
        assert!(matches!(cache.get_at(&btc, stored + Duration::from_secs(60)), CacheLookup::Fresh(_)));

        match cache.get_at(&btc, stored + Duration::from_secs(61)) {
            CacheLookup::Stale { age, .. } => assert_eq!(age, Duration::from_secs(61)),
            other => panic!("expected stale, got {:?}", other),
        }

        assert_eq!(cache.get_at(&btc, stored + Duration::from_secs(3601)), CacheLookup::Miss);
        // still retained for diagnostics
        assert!(cache.peek(&btc).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn put_overwrites_and_restarts_clock() {
        let cache = cache();
        let btc = Symbol::parse("BTC").unwrap();
        cache.put(quote("BTC", 1.0));

        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(matches!(cache.get(&btc), CacheLookup::Stale { .. }));

        cache.put(quote("BTC", 2.0));
        match cache.get(&btc) {
            CacheLookup::Fresh(q) => assert_eq!(q.price, Price::from_f64(2.0).unwrap()),
            other => panic!("expected fresh, got {:?}", other),
        }
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stats_and_clear() {
        let cache = cache();
        cache.put(quote("ETH", 3_000.0));
        tokio::time::advance(Duration::from_secs(4000)).await;
        cache.put(quote("SOL", 150.0));
        tokio::time::advance(Duration::from_secs(90)).await;
        cache.put(quote("CRO", 0.1));

        assert_eq!(cache.stats(), CacheStats { fresh: 1, stale: 1, expired: 1 });

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&Symbol::parse("CRO").unwrap()), CacheLookup::Miss);
    }
}
