use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use crate::config::SecondarySourceConfig;
use crate::error::SourceError;
use crate::events::quote::{Quote, SourceTag};
use crate::price_infra::connectors::{parse_optional_f64, PriceSource};
use crate::types::price::Price;
use crate::types::symbol::Symbol;
use crate::types::timestamp::Timestamp;

// Exchange error code for an unknown trading pair
const INVALID_SYMBOL_CODE: i64 = -1121;

struct LatestUpdate {
    quote: Quote,
    received_at: Instant,
}

/// Secondary adapter. Serves the most recent push update for a symbol when
/// it is young enough, and otherwise pulls a 24h ticker over REST.
pub struct StreamSource {
    source_id: String,
    latest: DashMap<Symbol, LatestUpdate>,
    client: Client,
    rest_url: Option<String>,
    quote_currency: String,
    max_update_age: Duration,
}

impl StreamSource {
    pub fn new(config: &SecondarySourceConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &SecondarySourceConfig) -> Self {
        let rest_url = config.rest_url.trim_end_matches('/');
        StreamSource {
            source_id: "secondary-stream".to_string(),
            latest: DashMap::new(),
            client,
            rest_url: (!rest_url.is_empty()).then(|| rest_url.to_string()),
            quote_currency: config.quote_currency.to_uppercase(),
            max_update_age: config.max_update_age(),
        }
    }

    /// Records a push update; called by the feed forwarder.
    pub fn ingest(&self, quote: Quote) {
        let quote = if quote.source == SourceTag::Secondary {
            quote
        } else {
            quote.with_source(SourceTag::Secondary)
        };
        self.latest.insert(quote.symbol.clone(), LatestUpdate {
            quote,
            received_at: Instant::now(),
        });
    }

    pub fn latest(&self, symbol: &Symbol) -> Option<Quote> {
        self.latest.get(symbol)
            .filter(|u| u.received_at.elapsed() <= self.max_update_age)
            .map(|u| u.quote.clone())
    }

    pub fn tracked_symbols(&self) -> usize {
        self.latest.len()
    }

    pub fn ticker_symbol(&self, symbol: &Symbol) -> String {
        symbol.pair("", &self.quote_currency)
    }

    async fn pull(&self, symbol: &Symbol) -> Result<Quote, SourceError> {
        let Some(rest_url) = &self.rest_url else {
            return Err(SourceError::UnsupportedSymbol(symbol.clone()));
        };
        let url = format!("{}/api/v3/ticker/24hr", rest_url);

        let response = self.client
            .get(&url)
            .query(&[("symbol", self.ticker_symbol(symbol))])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let api_error: Option<ApiError> = serde_json::from_str(&body).ok();
            return Err(match api_error {
                Some(e) if status == StatusCode::BAD_REQUEST && e.code == INVALID_SYMBOL_CODE => {
                    SourceError::UnsupportedSymbol(symbol.clone())
                }
                Some(e) => SourceError::Status { code: e.code, message: e.msg },
                None => SourceError::Status { code: status.as_u16() as i64, message: body },
            });
        }

        let ticker: Ticker24h = response.json().await?;
        ticker.into_quote(symbol.clone())
    }
}

#[async_trait]
impl PriceSource for StreamSource {
    fn tag(&self) -> SourceTag {
        SourceTag::Secondary
    }

    fn name(&self) -> &str {
        &self.source_id
    }

    async fn fetch(&self, symbol: &Symbol) -> Result<Quote, SourceError> {
        if let Some(quote) = self.latest(symbol) {
            tracing::trace!("Serving {} from stream update", symbol);
            return Ok(quote);
        }
        self.pull(symbol).await
    }
}

#[derive(Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    last_price: String,
    price_change_percent: Option<String>,
    volume: Option<String>,
    high_price: Option<String>,
    low_price: Option<String>,
    close_time: Option<u64>,
}

impl Ticker24h {
    fn into_quote(self, symbol: Symbol) -> Result<Quote, SourceError> {
        let price: Price = self.last_price.parse()
            .map_err(|_| SourceError::InvalidPrice(self.last_price.clone()))?;

        Ok(Quote {
            symbol,
            price,
            change_24h: parse_optional_f64(self.price_change_percent.as_deref()),
            volume_24h: parse_optional_f64(self.volume.as_deref()).filter(|v| *v >= 0.0),
            high_24h: self.high_price.as_deref().and_then(|h| h.parse().ok()),
            low_24h: self.low_price.as_deref().and_then(|l| l.parse().ok()),
            observed_at: self.close_time.map(Timestamp::from_millis).unwrap_or_else(Timestamp::now),
            source: SourceTag::Secondary,
        })
    }
}
