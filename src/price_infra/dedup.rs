use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use crate::error::{Error, Result};
use crate::events::quote::Quote;
use crate::observability::metrics::INFLIGHT_REQUESTS;
use crate::types::symbol::Symbol;

type SharedResolution = Shared<BoxFuture<'static, Result<Quote>>>;

#[derive(Clone)]
struct InFlight {
    id: u64,
    resolution: SharedResolution,
}

/// Drops the map entry it was created for once the fetch task ends,
/// including when the fetch panics or the task is cancelled.
struct SettleGuard {
    in_flight: Arc<DashMap<Symbol, InFlight>>,
    symbol: Symbol,
    id: u64,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        // a newer round for the same symbol may already be registered
        self.in_flight.remove_if(&self.symbol, |_, entry| entry.id == self.id);
        INFLIGHT_REQUESTS.dec();
    }
}

/// Coalesces concurrent resolutions of the same symbol into one upstream
/// fetch. At most one in-flight entry exists per symbol; it is removed as
/// soon as the fetch settles, whatever the outcome.
#[derive(Default)]
pub struct RequestDeduplicator {
    in_flight: Arc<DashMap<Symbol, InFlight>>,
    next_id: AtomicU64,
}

impl RequestDeduplicator {
    pub fn new() -> Self {
        RequestDeduplicator {
            in_flight: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Joins the outstanding fetch for `symbol`, or starts one with `fetcher`.
    /// The fetch runs on its own task so it completes even if every waiter
    /// is dropped. A fetch that panics settles as `NoPriceAvailable`.
    pub async fn resolve<F, Fut>(&self, symbol: &Symbol, fetcher: F) -> Result<Quote>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Quote>> + Send + 'static,
    {
        let shared = match self.in_flight.entry(symbol.clone()) {
            Entry::Occupied(entry) => {
                tracing::debug!("Joining in-flight resolution for {}", symbol);
                entry.get().resolution.clone()
            }
            Entry::Vacant(entry) => {
                let fetch = fetcher();
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);

                INFLIGHT_REQUESTS.inc();
                let guard = SettleGuard {
                    in_flight: Arc::clone(&self.in_flight),
                    symbol: symbol.clone(),
                    id,
                };
                // removal waits on the shard lock held by `entry` until the insert
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    fetch.await
                });

                let owned = symbol.clone();
                let resolution = async move {
                    handle.await.unwrap_or_else(|e| {
                        tracing::error!("Resolution task for {} failed: {}", owned, e);
                        Err(Error::NoPriceAvailable(owned))
                    })
                }
                .boxed()
                .shared();

                entry.insert(InFlight { id, resolution: resolution.clone() });
                resolution
            }
        };

        shared.await
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, symbol: &Symbol) -> bool {
        self.in_flight.contains_key(symbol)
    }
}
