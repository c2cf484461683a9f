pub mod batch;
pub mod cache;
pub mod chain;
pub mod connectors;
pub mod dedup;
pub mod feed;
pub mod rate_limiter;
pub mod refresher;
pub mod resolver;
pub mod service;

pub use batch::BatchFetcher;
pub use cache::{CacheLookup, CacheStats, PriceCache};
pub use chain::SourceChain;
pub use connectors::{PriceSource, RestTickerSource, StreamSource};
pub use dedup::RequestDeduplicator;
pub use feed::{FeedTransport, ReconnectPolicy, ReconnectionManager, WebSocketTransport};
pub use rate_limiter::RateLimiter;
pub use refresher::BackgroundRefresher;
pub use resolver::{FallbackResolver, StableSet};
pub use service::{PriceService, ServiceHealth, TransportFactory};
