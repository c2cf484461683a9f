use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use crate::config::PrimarySourceConfig;
use crate::error::SourceError;
use crate::events::quote::{Quote, SourceTag};
use crate::price_infra::connectors::{parse_optional_f64, PriceSource};
use crate::types::price::Price;
use crate::types::symbol::Symbol;
use crate::types::timestamp::Timestamp;

/// Request/response ticker endpoint (`public/get-tickers`), keyed by
/// `BASE_QUOTE` instrument names.
pub struct RestTickerSource {
    source_id: String,
    client: Client,
    base_url: String,
    quote_currency: String,
}

impl RestTickerSource {
    pub fn new(config: &PrimarySourceConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &PrimarySourceConfig) -> Self {
        RestTickerSource {
            source_id: "primary-rest".to_string(),
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            quote_currency: config.quote_currency.to_uppercase(),
        }
    }

    pub fn instrument_name(&self, symbol: &Symbol) -> String {
        symbol.pair("_", &self.quote_currency)
    }
}

#[async_trait]
impl PriceSource for RestTickerSource {
    fn tag(&self) -> SourceTag {
        SourceTag::Primary
    }

    fn name(&self) -> &str {
        &self.source_id
    }

    async fn fetch(&self, symbol: &Symbol) -> Result<Quote, SourceError> {
        let instrument = self.instrument_name(symbol);
        let url = format!("{}/public/get-tickers", self.base_url);

        let response = self.client
            .get(&url)
            .query(&[("instrument_name", instrument.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        let envelope: TickerEnvelope = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                SourceError::Malformed(e.to_string())
            } else {
                SourceError::Status { code: status.as_u16() as i64, message: body.clone() }
            }
        })?;

        if envelope.code != 0 || !status.is_success() {
            return Err(SourceError::Status {
                code: envelope.code,
                message: envelope.message.unwrap_or_else(|| status.to_string()),
            });
        }

        let ticker = envelope.result
            .and_then(|r| r.data.into_iter().find(|t| t.i.eq_ignore_ascii_case(&instrument)))
            .ok_or(SourceError::Empty)?;

        ticker.into_quote(symbol.clone())
    }
}

#[derive(Deserialize)]
struct TickerEnvelope {
    #[serde(default)]
    code: i64,
    message: Option<String>,
    result: Option<TickerResult>,
}

#[derive(Deserialize)]
struct TickerResult {
    #[serde(default)]
    data: Vec<TickerData>,
}

#[derive(Clone, Deserialize)]
struct TickerData {
    i: String,              // Instrument name
    a: Option<String>,      // Last traded price
    h: Option<String>,      // 24h high
    l: Option<String>,      // 24h low
    v: Option<String>,      // 24h volume
    c: Option<String>,      // 24h change as a fraction
    t: Option<u64>,         // Ticker time (ms)
}

impl TickerData {
    fn into_quote(self, symbol: Symbol) -> Result<Quote, SourceError> {
        let last = self.a.as_deref().ok_or(SourceError::Empty)?;
        let price: Price = last.parse()
            .map_err(|_| SourceError::InvalidPrice(last.to_string()))?;

        Ok(Quote {
            symbol,
            price,
            change_24h: parse_optional_f64(self.c.as_deref()).map(|c| c * 100.0),
            volume_24h: parse_optional_f64(self.v.as_deref()).filter(|v| *v >= 0.0),
            high_24h: self.h.as_deref().and_then(|h| h.parse().ok()),
            low_24h: self.l.as_deref().and_then(|l| l.parse().ok()),
            observed_at: self.t.map(Timestamp::from_millis).unwrap_or_else(Timestamp::now),
            source: SourceTag::Primary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> RestTickerSource {
        RestTickerSource::new(&PrimarySourceConfig::default())
    }

    #[test]
    fn derives_instrument_names() {
        let cro = Symbol::parse("cro").unwrap();
        assert_eq!(source().instrument_name(&cro), "CRO_USDT");
    }

    #[test]
    fn converts_fractional_change_to_percent() {
        let data = TickerData {
            i: "BTC_USDT".into(),
            a: Some("65000.5".into()),
            h: Some("66000".into()),
            l: Some("64000".into()),
            v: Some("1234.5".into()),
            c: Some("-0.0125".into()),
            t: Some(1_700_000_000_000),
        };
        let quote = data.into_quote(Symbol::parse("BTC").unwrap()).unwrap();
        assert_eq!(quote.price, "65000.5".parse::<Price>().unwrap());
        assert!((quote.change_24h.unwrap() + 1.25).abs() < 1e-9);
        assert_eq!(quote.high_24h, Some("66000".parse::<Price>().unwrap()));
        assert_eq!(quote.observed_at.as_millis(), 1_700_000_000_000);
        assert_eq!(quote.source, SourceTag::Primary);
    }

    #[test]
    fn missing_or_negative_price_is_an_error() {
        let mut data = TickerData {
            i: "BTC_USDT".into(),
            a: None,
            h: None,
            l: None,
            v: None,
            c: None,
            t: None,
        };
        let btc = Symbol::parse("BTC").unwrap();
        assert_eq!(data.clone().into_quote(btc.clone()), Err(SourceError::Empty));

        data.a = Some("-3".into());
        assert!(matches!(data.into_quote(btc), Err(SourceError::InvalidPrice(_))));
    }
}
