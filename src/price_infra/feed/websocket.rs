use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use crate::config::SecondarySourceConfig;
use crate::error::{Error, Result, SourceError};
use crate::events::quote::{Quote, SourceTag};
use crate::price_infra::connectors::parse_optional_f64;
use crate::price_infra::feed::transport::FeedTransport;
use crate::types::price::Price;
use crate::types::symbol::Symbol;
use crate::types::timestamp::Timestamp;

/// 24h ticker stream over a websocket, one `<pair>@ticker` channel per symbol.
pub struct WebSocketTransport {
    ws_url: String,
    quote_currency: String,
    stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    next_request_id: u64,
}

impl WebSocketTransport {
    pub fn new(config: &SecondarySourceConfig) -> Self {
        WebSocketTransport {
            ws_url: config.ws_url.clone(),
            quote_currency: config.quote_currency.to_uppercase(),
            stream: None,
            next_request_id: 1,
        }
    }

    fn channel(&self, symbol: &Symbol) -> String {
        format!("{}@ticker", symbol.pair("", &self.quote_currency).to_lowercase())
    }

    async fn send_request(&mut self, method: &str, symbols: &[Symbol]) -> Result<()> {
        if symbols.is_empty() {
            return Ok(());
        }

        let request = StreamRequest {
            method: method.to_string(),
            params: symbols.iter().map(|s| self.channel(s)).collect(),
            id: self.next_request_id,
        };
        self.next_request_id += 1;

        let payload = serde_json::to_string(&request)
            .map_err(|e| SourceError::Malformed(e.to_string()))?;

        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        stream.send(Message::Text(payload))
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        tracing::debug!("{} {:?}", method, request.params);
        Ok(())
    }
}

#[async_trait]
impl FeedTransport for WebSocketTransport {
    async fn connect(&mut self) -> Result<()> {
        let (ws_stream, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| SourceError::Transport(format!("WebSocket connection failed: {}", e)))?;
        self.stream = Some(ws_stream);
        tracing::info!("Connected to price stream: {}", self.ws_url);
        Ok(())
    }

    async fn subscribe(&mut self, symbols: &[Symbol]) -> Result<()> {
        self.send_request("SUBSCRIBE", symbols).await
    }

    async fn unsubscribe(&mut self, symbols: &[Symbol]) -> Result<()> {
        self.send_request("UNSUBSCRIBE", symbols).await
    }

    async fn next_update(&mut self) -> Result<Quote> {
        let quote_currency = self.quote_currency.clone();
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        loop {
            let Some(msg) = stream.next().await else {
                return Err(Error::ConnectionClosed);
            };
            let msg = msg.map_err(|e| SourceError::Transport(e.to_string()))?;

            match msg {
                Message::Text(text) => {
                    if let Some(quote) = parse_ticker_event(&text, &quote_currency) {
                        return Ok(quote);
                    }
                    // subscription acks and other channels
                    tracing::trace!("Skipping stream frame: {}", text);
                }
                Message::Ping(payload) => {
                    stream.send(Message::Pong(payload))
                        .await
                        .map_err(|e| SourceError::Transport(e.to_string()))?;
                }
                Message::Close(frame) => {
                    tracing::info!("Price stream closed by peer: {:?}", frame);
                    return Err(Error::ConnectionClosed);
                }
                _ => {}
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                tracing::debug!("Error closing price stream: {}", e);
            }
        }
    }
}

#[derive(Serialize)]
struct StreamRequest {
    method: String,
    params: Vec<String>,
    id: u64,
}

#[derive(Deserialize)]
struct TickerEvent {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "E")]
    event_time: Option<u64>,
    #[serde(rename = "s")]
    pair: String,
    #[serde(rename = "c")]
    last: String,
    #[serde(rename = "P")]
    change_percent: Option<String>,
    #[serde(rename = "v")]
    volume: Option<String>,
    #[serde(rename = "h")]
    high: Option<String>,
    #[serde(rename = "l")]
    low: Option<String>,
}

/// `None` for anything that is not a well-formed ticker for `quote_currency`.
fn parse_ticker_event(text: &str, quote_currency: &str) -> Option<Quote> {
    let event: TickerEvent = serde_json::from_str(text).ok()?;
    if event.event_type != "24hrTicker" {
        return None;
    }

    let base = event.pair.to_uppercase().strip_suffix(quote_currency)?.to_string();
    let symbol = Symbol::parse(&base).ok()?;
    let price: Price = event.last.parse().ok()?;

    Some(Quote {
        symbol,
        price,
        change_24h: parse_optional_f64(event.change_percent.as_deref()),
        volume_24h: parse_optional_f64(event.volume.as_deref()).filter(|v| *v >= 0.0),
        high_24h: event.high.as_deref().and_then(|h| h.parse().ok()),
        low_24h: event.low.as_deref().and_then(|l| l.parse().ok()),
        observed_at: event.event_time.map(Timestamp::from_millis).unwrap_or_else(Timestamp::now),
        source: SourceTag::Secondary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ticker_frames() {
        let frame = r#"{"e":"24hrTicker","E":1700000000123,"s":"ETHUSDT","c":"3012.55","P":"-2.10","v":"100.5","h":"3100","l":"2950"}"#;
        let quote = parse_ticker_event(frame, "USDT").unwrap();
        assert_eq!(quote.symbol.as_str(), "ETH");
        assert_eq!(quote.price, "3012.55".parse::<Price>().unwrap());
        assert_eq!(quote.change_24h, Some(-2.10));
        assert_eq!(quote.observed_at.as_millis(), 1_700_000_000_123);
        assert_eq!(quote.source, SourceTag::Secondary);
    }

    #[test]
    fn skips_acks_foreign_pairs_and_bad_prices() {
        assert!(parse_ticker_event(r#"{"result":null,"id":1}"#, "USDT").is_none());
        assert!(parse_ticker_event(r#"{"e":"24hrTicker","s":"ETHBTC","c":"0.05"}"#, "USDT").is_none());
        assert!(parse_ticker_event(r#"{"e":"24hrTicker","s":"ETHUSDT","c":"-1"}"#, "USDT").is_none());
        assert!(parse_ticker_event(r#"{"e":"trade","s":"ETHUSDT","c":"1"}"#, "USDT").is_none());
    }

    #[test]
    fn channel_names_are_lowercase_pairs() {
        let transport = WebSocketTransport::new(&SecondarySourceConfig::default());
        assert_eq!(transport.channel(&Symbol::parse("btc").unwrap()), "btcusdt@ticker");
    }
}
