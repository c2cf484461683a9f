use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::Stream;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::events::feed::{ConnectionState, FeedEvent};
use crate::events::quote::Quote;
use crate::price_infra::batch::BatchFetcher;
use crate::price_infra::cache::{CacheStats, PriceCache};
use crate::price_infra::chain::SourceChain;
use crate::price_infra::connectors::{PriceSource, RestTickerSource, StreamSource};
use crate::price_infra::dedup::RequestDeduplicator;
use crate::price_infra::feed::{FeedTransport, ReconnectPolicy, ReconnectionManager, WebSocketTransport};
use crate::price_infra::resolver::{FallbackResolver, StableSet};
use crate::types::symbol::Symbol;
use crate::utils::task_supervisor::TaskSupervisor;

const FEED_WORKER_TASK: &str = "feed_worker";
const FEED_FORWARDER_TASK: &str = "feed_forwarder";
const WORKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Builds a fresh transport for each `start`.
pub type TransportFactory = Box<dyn Fn() -> Box<dyn FeedTransport> + Send + Sync>;

struct FeedWiring {
    factory: TransportFactory,
    sink: Arc<StreamSource>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServiceHealth {
    pub started: bool,
    pub feed_state: ConnectionState,
    pub background_tasks: usize,
    pub cache: CacheStats,
    pub in_flight: usize,
}

/// Price lookups for valuation and trading callers.
///
/// Construct once at process start and share by reference. Lookups work
/// whether or not the service is started; `start` only brings up the push
/// feed that keeps the secondary source warm.
pub struct PriceService {
    config: AppConfig,
    cache: Arc<PriceCache>,
    dedup: Arc<RequestDeduplicator>,
    resolver: Arc<FallbackResolver>,
    batch: BatchFetcher,
    feed: Option<FeedWiring>,
    started: AtomicBool,
    subscriptions: Mutex<BTreeSet<Symbol>>,
    manager: Mutex<Option<ReconnectionManager>>,
    tasks: tokio::sync::Mutex<TaskSupervisor>,
}

impl PriceService {
    /// Service over `sources` in priority order, without a push feed.
    pub fn new(config: AppConfig, sources: Vec<Arc<dyn PriceSource>>) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(PriceCache::from_config(&config.cache));
        let dedup = Arc::new(RequestDeduplicator::new());
        let chain = Arc::new(SourceChain::new(
            sources,
            config.resolver.source_timeout(),
            Arc::clone(&cache),
        ));
        let resolver = Arc::new(FallbackResolver::new(
            StableSet::from_config(&config.resolver)?,
            Arc::clone(&cache),
            chain,
            Arc::clone(&dedup),
            &config.cache,
        ));
        let batch = BatchFetcher::new(Arc::clone(&resolver), &config.batch);

        let subscriptions = config.feed.subscriptions.iter()
            .filter_map(|raw| Symbol::parse(raw).ok())
            .collect();

        Ok(PriceService {
            config,
            cache,
            dedup,
            resolver,
            batch,
            feed: None,
            started: AtomicBool::new(false),
            subscriptions: Mutex::new(subscriptions),
            manager: Mutex::new(None),
            tasks: tokio::sync::Mutex::new(TaskSupervisor::new()),
        })
    }

    /// Attaches a push feed whose price updates are recorded into `sink`.
    pub fn with_feed(mut self, factory: TransportFactory, sink: Arc<StreamSource>) -> Self {
        self.feed = Some(FeedWiring { factory, sink });
        self
    }

    /// Production wiring: REST ticker first, stream-backed secondary second,
    /// websocket feed feeding the secondary.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let primary: Arc<dyn PriceSource> = Arc::new(RestTickerSource::new(&config.primary));
        let secondary = Arc::new(StreamSource::new(&config.secondary));
        let secondary_config = config.secondary.clone();

        let service = Self::new(config, vec![primary, secondary.clone() as Arc<dyn PriceSource>])?;
        let factory: TransportFactory = Box::new(move || {
            Box::new(WebSocketTransport::new(&secondary_config)) as Box<dyn FeedTransport>
        });
        Ok(service.with_feed(factory, secondary))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<PriceCache> {
        &self.cache
    }

    pub fn resolver(&self) -> &Arc<FallbackResolver> {
        &self.resolver
    }

    /// Fails with `NoPriceAvailable` once every tier is exhausted, or
    /// `InvalidSymbol` when `symbol` cannot be canonicalised.
    pub async fn get_price(&self, symbol: &str) -> Result<Quote> {
        self.resolver.resolve_str(symbol).await
    }

    /// Best effort: unresolvable or unparseable symbols are absent from the map.
    pub async fn get_prices<I, S>(&self, symbols: I) -> HashMap<Symbol, Quote>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed: Vec<Symbol> = symbols.into_iter()
            .filter_map(|raw| match Symbol::parse(raw.as_ref()) {
                Ok(symbol) => Some(symbol),
                Err(e) => {
                    tracing::warn!("Skipping {}", e);
                    None
                }
            })
            .collect();

        self.batch.resolve_batch(parsed).await
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn feed_state(&self) -> ConnectionState {
        self.lock_manager()
            .as_ref()
            .map(|m| m.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Feed events; only available while started.
    pub fn events(&self) -> Result<impl Stream<Item = FeedEvent> + Send + use<>> {
        self.lock_manager()
            .as_ref()
            .map(|m| m.events())
            .ok_or(Error::NotStarted)
    }

    pub fn subscribe(&self, symbol: &str) -> Result<()> {
        let symbol = Symbol::parse(symbol)?;
        let added = self.lock_subscriptions().insert(symbol.clone());
        match self.lock_manager().as_ref() {
            Some(manager) if added => manager.subscribe(symbol),
            _ => Ok(()),
        }
    }

    pub fn unsubscribe(&self, symbol: &str) -> Result<()> {
        let symbol = Symbol::parse(symbol)?;
        let removed = self.lock_subscriptions().remove(&symbol);
        match self.lock_manager().as_ref() {
            Some(manager) if removed => manager.unsubscribe(symbol),
            _ => Ok(()),
        }
    }

    /// Feed reconnect after `ConnectionLost`.
    pub fn reconnect_feed(&self) -> Result<()> {
        self.lock_manager()
            .as_ref()
            .ok_or(Error::NotStarted)?
            .connect()
    }

    pub async fn start(&self) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }

        let Some(feed) = &self.feed else {
            tracing::info!("Price service started without a push feed");
            return Ok(());
        };

        let (manager, worker) = ReconnectionManager::spawn(
            (feed.factory)(),
            ReconnectPolicy::from_config(&self.config.feed),
            self.config.feed.event_buffer,
        );
        tasks.adopt(FEED_WORKER_TASK, worker);
        tasks.spawn(FEED_FORWARDER_TASK, forward_updates(manager.event_receiver(), Arc::clone(&feed.sink)));

        let subscriptions: Vec<Symbol> = self.lock_subscriptions().iter().cloned().collect();
        for symbol in subscriptions {
            manager.subscribe(symbol)?;
        }
        manager.connect()?;

        *self.lock_manager() = Some(manager);
        tracing::info!("Price service started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        let manager = self.lock_manager().take();

        if let Some(manager) = manager {
            // worker may already be gone
            let _ = manager.shutdown();
            tasks.wait_for_task(FEED_WORKER_TASK, WORKER_SHUTDOWN_GRACE).await?;
        }
        tasks.shutdown_all().await;
        self.started.store(false, Ordering::SeqCst);

        tracing::info!("Price service stopped");
        Ok(())
    }

    pub async fn health(&self) -> ServiceHealth {
        let mut tasks = self.tasks.lock().await;
        if let Err(e) = tasks.check_health() {
            tracing::warn!("Price service background task died: {}", e);
        }

        ServiceHealth {
            started: self.is_started(),
            feed_state: self.feed_state(),
            background_tasks: tasks.active_task_count(),
            cache: self.cache.stats(),
            in_flight: self.dedup.in_flight_count(),
        }
    }

    fn lock_manager(&self) -> std::sync::MutexGuard<'_, Option<ReconnectionManager>> {
        self.manager.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_subscriptions(&self) -> std::sync::MutexGuard<'_, BTreeSet<Symbol>> {
        self.subscriptions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn forward_updates(
    mut events: tokio::sync::broadcast::Receiver<FeedEvent>,
    sink: Arc<StreamSource>,
) {
    loop {
        match events.recv().await {
            Ok(FeedEvent::PriceUpdate(quote)) => sink.ingest(quote),
            Ok(FeedEvent::Connected) => tracing::debug!("Feed connected"),
            Ok(FeedEvent::ConnectionLost { attempts }) => {
                tracing::warn!(
                    "Feed connection lost after {} attempts; secondary source falls back to REST pulls",
                    attempts
                );
            }
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!("Feed forwarder lagged, {} updates dropped", missed);
            }
            Err(RecvError::Closed) => break,
        }
    }
}
