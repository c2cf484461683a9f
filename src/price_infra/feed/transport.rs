use async_trait::async_trait;
use crate::error::Result;
use crate::events::quote::Quote;
use crate::types::symbol::Symbol;

/// Push connection driven by the reconnection manager. Only the manager's
/// worker task touches a transport, so no `Sync` bound is needed.
#[async_trait]
pub trait FeedTransport: Send {
    async fn connect(&mut self) -> Result<()>;

    async fn subscribe(&mut self, symbols: &[Symbol]) -> Result<()>;

    async fn unsubscribe(&mut self, symbols: &[Symbol]) -> Result<()>;

    /// Next price update. An `Err` means the stream is gone and the
    /// connection must be re-established. Must be cancel-safe.
    async fn next_update(&mut self) -> Result<Quote>;

    async fn close(&mut self);
}

#[async_trait]
impl<T: FeedTransport + ?Sized> FeedTransport for Box<T> {
    async fn connect(&mut self) -> Result<()> {
        (**self).connect().await
    }

    async fn subscribe(&mut self, symbols: &[Symbol]) -> Result<()> {
        (**self).subscribe(symbols).await
    }

    async fn unsubscribe(&mut self, symbols: &[Symbol]) -> Result<()> {
        (**self).unsubscribe(symbols).await
    }

    async fn next_update(&mut self) -> Result<Quote> {
        (**self).next_update().await
    }

    async fn close(&mut self) {
        (**self).close().await
    }
}
