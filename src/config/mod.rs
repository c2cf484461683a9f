use std::time::Duration;
use serde::{Deserialize, Serialize};

pub mod loader;

pub use loader::AppConfig;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_ms: u64,
    pub stale_serve_window_ms: u64,
    pub max_staleness_ms: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// How long past the TTL a cached quote is still served immediately
    /// while a refresh runs in the background.
    pub fn stale_serve_window(&self) -> Duration {
        Duration::from_millis(self.stale_serve_window_ms)
    }

    pub fn max_staleness(&self) -> Duration {
        Duration::from_millis(self.max_staleness_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl_ms: 60_000,                 // 1 minute
            stale_serve_window_ms: 300_000, // 5 minutes
            max_staleness_ms: 3_600_000,    // 1 hour
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub source_timeout_ms: u64,
    pub stable_symbols: Vec<String>,
    pub stable_price: f64,
}

impl ResolverConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            source_timeout_ms: 1_500,
            stable_symbols: ["USDC", "USDT", "DAI", "BUSD", "TUSD", "USDP"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            stable_price: 1.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    pub chunk_size: usize,
    pub rate_limit_per_sec: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            chunk_size: 5,
            rate_limit_per_sec: 100,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PrimarySourceConfig {
    pub base_url: String,
    pub quote_currency: String,
}

impl Default for PrimarySourceConfig {
    fn default() -> Self {
        PrimarySourceConfig {
            base_url: "https://api.crypto.com/exchange/v1".to_string(),
            quote_currency: "USDT".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SecondarySourceConfig {
    pub rest_url: String,
    pub ws_url: String,
    pub quote_currency: String,
    pub max_update_age_ms: u64,
}

impl SecondarySourceConfig {
    pub fn max_update_age(&self) -> Duration {
        Duration::from_millis(self.max_update_age_ms)
    }
}

impl Default for SecondarySourceConfig {
    fn default() -> Self {
        SecondarySourceConfig {
            rest_url: "https://api.binance.com".to_string(),
            ws_url: "wss://stream.binance.com:9443/ws".to_string(),
            quote_currency: "USDT".to_string(),
            max_update_age_ms: 15_000,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub max_reconnect_attempts: u32,
    pub connect_timeout_ms: u64,
    pub event_buffer: usize,
    pub subscriptions: Vec<String>,
}

impl FeedConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            backoff_base_ms: 1_000,
            backoff_cap_ms: 30_000,
            max_reconnect_attempts: 5,
            connect_timeout_ms: 10_000,
            event_buffer: 1_024,
            subscriptions: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            json: false,
            filter: "info".to_string(),
        }
    }
}
