use crate::config::*;
use crate::error::{Error, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub resolver: ResolverConfig,
    pub batch: BatchConfig,
    pub primary: PrimarySourceConfig,
    pub secondary: SecondarySourceConfig,
    pub feed: FeedConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Layers `config/default`, `config/{env}` and `QUOTEINFRA__*` variables.
    pub fn load(env: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("QUOTEINFRA")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("resolver.stable_symbols")
                    .with_list_parse_key("feed.subscriptions")
                    .try_parsing(true),
            )
            .build()?;

        let app: AppConfig = config.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    pub fn from_toml_str(document: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(document, FileFormat::Toml))
            .build()?;

        let app: AppConfig = config.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.ttl_ms == 0 {
            return Err(Error::ConfigError("cache.ttl_ms must be positive".into()));
        }
        if self.cache.max_staleness_ms < self.cache.ttl_ms {
            return Err(Error::ConfigError(
                "cache.max_staleness_ms must be at least cache.ttl_ms".into(),
            ));
        }
        if self.resolver.source_timeout_ms == 0 {
            return Err(Error::ConfigError("resolver.source_timeout_ms must be positive".into()));
        }
        if !self.resolver.stable_price.is_finite() || self.resolver.stable_price < 0.0 {
            return Err(Error::ConfigError("resolver.stable_price must be a non-negative number".into()));
        }
        if self.batch.chunk_size == 0 {
            return Err(Error::ConfigError("batch.chunk_size must be positive".into()));
        }
        if self.batch.rate_limit_per_sec == 0 {
            return Err(Error::ConfigError("batch.rate_limit_per_sec must be positive".into()));
        }
        if self.feed.backoff_base_ms == 0 || self.feed.backoff_cap_ms < self.feed.backoff_base_ms {
            return Err(Error::ConfigError(
                "feed.backoff_cap_ms must be at least feed.backoff_base_ms (> 0)".into(),
            ));
        }
        if self.feed.connect_timeout_ms == 0 {
            return Err(Error::ConfigError("feed.connect_timeout_ms must be positive".into()));
        }
        if self.feed.event_buffer == 0 {
            return Err(Error::ConfigError("feed.event_buffer must be positive".into()));
        }
        Ok(())
    }
}
