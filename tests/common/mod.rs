#![allow(dead_code)]

use async_trait::async_trait;
use quote_infra::config::AppConfig;
use quote_infra::error::{Error, Result, SourceError};
use quote_infra::events::quote::{Quote, SourceTag};
use quote_infra::price_infra::connectors::PriceSource;
use quote_infra::price_infra::feed::FeedTransport;
use quote_infra::price_infra::PriceService;
use quote_infra::types::price::Price;
use quote_infra::types::symbol::Symbol;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn sym(raw: &str) -> Symbol {
    Symbol::parse(raw).unwrap()
}

pub fn price(value: f64) -> Price {
    Price::from_f64(value).unwrap()
}

/// What a scripted source does on its next call.
#[derive(Clone, Debug)]
pub enum Behavior {
    /// Answers `price` after `delay`.
    Answer { price: f64, delay: Duration },
    /// Fails after `delay`.
    Fail { delay: Duration },
    /// Never answers; only the caller's timeout ends the call.
    Hang,
    /// Panics inside the adapter.
    Panic,
}

/// In-memory price source that counts calls and peak concurrency.
pub struct ScriptedSource {
    tag: SourceTag,
    name: String,
    behavior: Mutex<Behavior>,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    symbols_seen: Mutex<Vec<Symbol>>,
    failing_symbols: Mutex<HashSet<Symbol>>,
}

impl ScriptedSource {
    pub fn new(tag: SourceTag, behavior: Behavior) -> Arc<Self> {
        Arc::new(ScriptedSource {
            tag,
            name: format!("scripted-{}", tag),
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            symbols_seen: Mutex::new(Vec::new()),
            failing_symbols: Mutex::new(HashSet::new()),
        })
    }

    pub fn answering(tag: SourceTag, price: f64) -> Arc<Self> {
        Self::new(tag, Behavior::Answer { price, delay: Duration::ZERO })
    }

    pub fn failing(tag: SourceTag) -> Arc<Self> {
        Self::new(tag, Behavior::Fail { delay: Duration::ZERO })
    }

    pub fn set(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn answer(&self, price: f64) {
        self.set(Behavior::Answer { price, delay: Duration::ZERO });
    }

    pub fn fail(&self) {
        self.set(Behavior::Fail { delay: Duration::ZERO });
    }

    /// Fails `symbol` regardless of the scripted behavior.
    pub fn fail_for(&self, symbol: &str) {
        self.failing_symbols.lock().unwrap().insert(sym(symbol));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn symbols_seen(&self) -> Vec<Symbol> {
        self.symbols_seen.lock().unwrap().clone()
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PriceSource for ScriptedSource {
    fn tag(&self) -> SourceTag {
        self.tag
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, symbol: &Symbol) -> std::result::Result<Quote, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.symbols_seen.lock().unwrap().push(symbol.clone());

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        let behavior = if self.failing_symbols.lock().unwrap().contains(symbol) {
            Behavior::Fail { delay: Duration::ZERO }
        } else {
            self.behavior.lock().unwrap().clone()
        };
        match behavior {
            Behavior::Answer { price: value, delay } => {
                tokio::time::sleep(delay).await;
                Ok(Quote::new(symbol.clone(), price(value), self.tag))
            }
            Behavior::Fail { delay } => {
                tokio::time::sleep(delay).await;
                Err(SourceError::Transport(format!("{} unavailable", self.name)))
            }
            Behavior::Hang => std::future::pending().await,
            Behavior::Panic => panic!("{} blew up on {}", self.name, symbol),
        }
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.feed.subscriptions = Vec::new();
    config
}

pub fn service(
    config: AppConfig,
    primary: &Arc<ScriptedSource>,
    secondary: &Arc<ScriptedSource>,
) -> PriceService {
    let sources = vec![
        primary.clone() as Arc<dyn PriceSource>,
        secondary.clone() as Arc<dyn PriceSource>,
    ];
    PriceService::new(config, sources).unwrap()
}

/// Lets spawned background work run to completion under a paused clock.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Shared view into a `ScriptedTransport` owned by a feed worker.
#[derive(Default)]
pub struct TransportControl {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub fail_connects: AtomicBool,
    pub hang_connects: AtomicBool,
    pub subscribe_calls: Mutex<Vec<Vec<Symbol>>>,
    pub unsubscribe_calls: Mutex<Vec<Vec<Symbol>>>,
}

impl TransportControl {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_connects.store(failing, Ordering::SeqCst);
    }

    /// Makes every following `connect` hang until cancelled.
    pub fn set_hanging(&self, hanging: bool) {
        self.hang_connects.store(hanging, Ordering::SeqCst);
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> Vec<Vec<Symbol>> {
        self.subscribe_calls.lock().unwrap().clone()
    }
}

/// Feed transport driven from the test through an update channel. Sending
/// `Err` simulates the stream dropping.
pub struct ScriptedTransport {
    control: Arc<TransportControl>,
    updates: mpsc::UnboundedReceiver<Result<Quote>>,
    connected: bool,
}

pub type UpdateSender = mpsc::UnboundedSender<Result<Quote>>;

impl ScriptedTransport {
    pub fn new() -> (Self, Arc<TransportControl>, UpdateSender) {
        let control = Arc::new(TransportControl::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = ScriptedTransport {
            control: Arc::clone(&control),
            updates: rx,
            connected: false,
        };
        (transport, control, tx)
    }
}

#[async_trait]
impl FeedTransport for ScriptedTransport {
    async fn connect(&mut self) -> Result<()> {
        self.control.connects.fetch_add(1, Ordering::SeqCst);
        if self.control.hang_connects.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.control.fail_connects.load(Ordering::SeqCst) {
            return Err(SourceError::Transport("connection refused".into()).into());
        }
        self.connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, symbols: &[Symbol]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        self.control.subscribe_calls.lock().unwrap().push(symbols.to_vec());
        Ok(())
    }

    async fn unsubscribe(&mut self, symbols: &[Symbol]) -> Result<()> {
        self.control.unsubscribe_calls.lock().unwrap().push(symbols.to_vec());
        Ok(())
    }

    async fn next_update(&mut self) -> Result<Quote> {
        match self.updates.recv().await {
            Some(update) => update,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        if self.connected {
            self.control.closes.fetch_add(1, Ordering::SeqCst);
        }
        self.connected = false;
    }
}
