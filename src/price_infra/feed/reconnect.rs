use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};
use crate::config::FeedConfig;
use crate::error::{Error, Result};
use crate::events::feed::{ConnectionState, FeedEvent};
use crate::observability::metrics::{FEED_CONNECTION_LOST, FEED_RECONNECT_ATTEMPTS};
use crate::price_infra::feed::transport::FeedTransport;
use crate::types::symbol::Symbol;
use crate::utils::helper::exponential_backoff;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
    /// Bound on one connect plus subscription replay.
    pub connect_timeout: Duration,
}

impl ReconnectPolicy {
    pub fn from_config(config: &FeedConfig) -> Self {
        ReconnectPolicy {
            base: config.backoff_base(),
            cap: config.backoff_cap(),
            max_attempts: config.max_reconnect_attempts,
            connect_timeout: config.connect_timeout(),
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        exponential_backoff(self.base, attempt, self.cap)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&FeedConfig::default())
    }
}

#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    Subscribe(Symbol),
    Unsubscribe(Symbol),
    Shutdown,
}

/// Handle to the worker task that owns the push feed connection.
///
/// The worker is an explicit state machine:
///
/// ```text
/// Disconnected --connect()--> Connecting --ok--> Connected
///                              |    ^              |
///                         fail |    | delay        | stream error / close
///                              v    |              v
///                            BackingOff <----------+
/// ```
///
/// `BackingOff` waits `min(base * 2^n, cap)` where `n` counts the waits
/// since the last successful connect, so the first retry always waits
/// `base`. A connect that does not finish within `connect_timeout` counts
/// as failed. Once `max_attempts` consecutive connects have failed the
/// worker emits `ConnectionLost` and parks in `Disconnected` until
/// `connect()` is called again. Commands are served in every state.
/// Subscriptions are remembered across reconnects and replayed after every
/// successful connect.
#[derive(Clone)]
pub struct ReconnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<FeedEvent>,
    state: watch::Receiver<ConnectionState>,
}

impl ReconnectionManager {
    /// Starts the worker on the current runtime. The worker exits on
    /// `shutdown()` or once every handle is dropped.
    pub fn spawn<T>(transport: T, policy: ReconnectPolicy, event_buffer: usize) -> (Self, JoinHandle<()>)
    where
        T: FeedTransport + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(event_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let worker = FeedWorker {
            transport,
            policy,
            commands: command_rx,
            events: event_tx.clone(),
            state: state_tx,
            subscriptions: BTreeSet::new(),
            attempt: 0,
            retries: 0,
        };
        let handle = tokio::spawn(worker.run());

        let manager = ReconnectionManager {
            commands: command_tx,
            events: event_tx,
            state: state_rx,
        };
        (manager, handle)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::ChannelClosed)
    }

    pub fn connect(&self) -> Result<()> {
        self.send(Command::Connect)
    }

    pub fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect)
    }

    pub fn subscribe(&self, symbol: Symbol) -> Result<()> {
        self.send(Command::Subscribe(symbol))
    }

    pub fn unsubscribe(&self, symbol: Symbol) -> Result<()> {
        self.send(Command::Unsubscribe(symbol))
    }

    /// Closes the connection and stops the worker.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn event_receiver(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }

    /// Event stream; a lagging consumer skips what it missed.
    pub fn events(&self) -> impl Stream<Item = FeedEvent> + Send + use<> {
        BroadcastStream::new(self.events.subscribe()).filter_map(|event| match event {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                tracing::warn!("Feed event consumer lagged, {} events dropped", missed);
                None
            }
        })
    }
}

struct FeedWorker<T> {
    transport: T,
    policy: ReconnectPolicy,
    commands: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<FeedEvent>,
    state: watch::Sender<ConnectionState>,
    subscriptions: BTreeSet<Symbol>,
    /// Consecutive failed connects.
    attempt: u32,
    /// Backoff waits since the last successful connect.
    retries: u32,
}

impl<T: FeedTransport> FeedWorker<T> {
    async fn run(mut self) {
        let mut state = ConnectionState::Disconnected;

        loop {
            self.state.send_replace(state);

            let next = match state {
                ConnectionState::Disconnected => self.idle().await,
                ConnectionState::Connecting => self.try_connect().await,
                ConnectionState::Connected => self.pump().await,
                ConnectionState::BackingOff => self.back_off().await,
            };

            match next {
                Some(next) => state = next,
                None => break,
            }
        }

        self.transport.close().await;
        self.state.send_replace(ConnectionState::Disconnected);
        tracing::info!("Feed worker stopped");
    }

    fn emit(&self, event: FeedEvent) {
        // no receivers is fine
        let _ = self.events.send(event);
    }

    fn track(&mut self, command: Command) {
        match command {
            Command::Subscribe(symbol) => {
                self.subscriptions.insert(symbol);
            }
            Command::Unsubscribe(symbol) => {
                self.subscriptions.remove(&symbol);
            }
            _ => {}
        }
    }

    async fn idle(&mut self) -> Option<ConnectionState> {
        loop {
            match self.commands.recv().await {
                None | Some(Command::Shutdown) => return None,
                Some(Command::Connect) => {
                    self.attempt = 0;
                    self.retries = 0;
                    return Some(ConnectionState::Connecting);
                }
                Some(Command::Disconnect) => {}
                Some(other) => self.track(other),
            }
        }
    }

    async fn try_connect(&mut self) -> Option<ConnectionState> {
        FEED_RECONNECT_ATTEMPTS.inc();
        let replay: Vec<Symbol> = self.subscriptions.iter().cloned().collect();

        let outcome = {
            let connecting = tokio::time::timeout(
                self.policy.connect_timeout,
                handshake(&mut self.transport, &replay),
            );
            tokio::pin!(connecting);

            loop {
                tokio::select! {
                    outcome = &mut connecting => break Ok(outcome),
                    command = self.commands.recv() => match command {
                        None | Some(Command::Shutdown) => break Err(None),
                        Some(Command::Disconnect) => break Err(Some(ConnectionState::Disconnected)),
                        Some(Command::Connect) => {}
                        Some(Command::Subscribe(symbol)) => {
                            self.subscriptions.insert(symbol);
                        }
                        Some(Command::Unsubscribe(symbol)) => {
                            self.subscriptions.remove(&symbol);
                        }
                    },
                }
            }
        };

        let failure = match outcome {
            Ok(Ok(Ok(()))) => None,
            Ok(Ok(Err(e))) => Some(e.to_string()),
            Ok(Err(_)) => Some(format!("timed out after {:?}", self.policy.connect_timeout)),
            Err(None) => return None,
            Err(Some(next)) => {
                self.transport.close().await;
                self.attempt = 0;
                self.retries = 0;
                tracing::info!("Feed connect abandoned on request");
                return Some(next);
            }
        };

        if let Some(reason) = failure {
            self.attempt += 1;
            tracing::warn!(
                "Feed connect failed (attempt {}/{}): {}",
                self.attempt, self.policy.max_attempts, reason
            );
            self.transport.close().await;
            return Some(ConnectionState::BackingOff);
        }

        // catch up with subscription changes made while connecting
        let replayed: BTreeSet<Symbol> = replay.into_iter().collect();
        let added: Vec<Symbol> = self.subscriptions.difference(&replayed).cloned().collect();
        let removed: Vec<Symbol> = replayed.difference(&self.subscriptions).cloned().collect();
        if !added.is_empty() {
            if let Err(e) = self.transport.subscribe(&added).await {
                self.attempt += 1;
                tracing::warn!("Subscribing {} symbols failed: {}", added.len(), e);
                self.transport.close().await;
                return Some(ConnectionState::BackingOff);
            }
        }
        if !removed.is_empty() {
            if let Err(e) = self.transport.unsubscribe(&removed).await {
                tracing::warn!("Unsubscribe failed: {}", e);
            }
        }

        self.attempt = 0;
        self.retries = 0;
        tracing::info!("Feed connected, {} subscriptions active", self.subscriptions.len());
        self.emit(FeedEvent::Connected);
        Some(ConnectionState::Connected)
    }

    async fn pump(&mut self) -> Option<ConnectionState> {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => return None,
                    Some(Command::Disconnect) => {
                        self.transport.close().await;
                        tracing::info!("Feed disconnected on request");
                        return Some(ConnectionState::Disconnected);
                    }
                    Some(Command::Connect) => {}
                    Some(Command::Subscribe(symbol)) => {
                        if self.subscriptions.insert(symbol.clone()) {
                            if let Err(e) = self.transport.subscribe(&[symbol]).await {
                                tracing::warn!("Subscribe failed, reconnecting: {}", e);
                                self.transport.close().await;
                                return Some(ConnectionState::BackingOff);
                            }
                        }
                    }
                    Some(Command::Unsubscribe(symbol)) => {
                        if self.subscriptions.remove(&symbol) {
                            if let Err(e) = self.transport.unsubscribe(&[symbol]).await {
                                tracing::warn!("Unsubscribe failed: {}", e);
                            }
                        }
                    }
                },
                update = self.transport.next_update() => match update {
                    Ok(quote) => self.emit(FeedEvent::PriceUpdate(quote)),
                    Err(e) => {
                        tracing::warn!("Feed stream interrupted: {}", e);
                        self.transport.close().await;
                        return Some(ConnectionState::BackingOff);
                    }
                },
            }
        }
    }

    async fn back_off(&mut self) -> Option<ConnectionState> {
        if self.attempt >= self.policy.max_attempts {
            tracing::error!(
                "Feed connection lost after {} consecutive failed attempts",
                self.attempt
            );
            FEED_CONNECTION_LOST.inc();
            self.emit(FeedEvent::ConnectionLost { attempts: self.attempt });
            self.attempt = 0;
            self.retries = 0;
            return Some(ConnectionState::Disconnected);
        }

        let delay = self.policy.delay(self.retries);
        self.retries += 1;
        tracing::info!("Reconnecting feed in {:?}", delay);

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return Some(ConnectionState::Connecting),
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => return None,
                    Some(Command::Disconnect) => {
                        self.attempt = 0;
                        self.retries = 0;
                        return Some(ConnectionState::Disconnected);
                    }
                    Some(Command::Connect) => {}
                    Some(other) => self.track(other),
                },
            }
        }
    }
}

async fn handshake<T: FeedTransport>(transport: &mut T, replay: &[Symbol]) -> Result<()> {
    transport.connect().await?;
    if replay.is_empty() {
        tracing::debug!("No subscriptions to replay");
        return Ok(());
    }
    transport.subscribe(replay).await
}
