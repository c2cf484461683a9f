mod common;

use common::*;
use quote_infra::config::{PrimarySourceConfig, SecondarySourceConfig};
use quote_infra::error::SourceError;
use quote_infra::events::quote::SourceTag;
use quote_infra::price_infra::connectors::{fetch_with_timeout, PriceSource, RestTickerSource, StreamSource};
use quote_infra::price_infra::PriceService;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn primary_for(server: &MockServer) -> RestTickerSource {
    RestTickerSource::new(&PrimarySourceConfig {
        base_url: server.uri(),
        quote_currency: "USDT".to_string(),
    })
}

fn secondary_for(server: &MockServer) -> StreamSource {
    StreamSource::new(&SecondarySourceConfig {
        rest_url: server.uri(),
        ..SecondarySourceConfig::default()
    })
}

async fn mount_ticker(server: &MockServer, instrument: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/public/get-tickers"))
        .and(query_param("instrument_name", instrument))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn primary_parses_ticker_envelope() {
    let server = MockServer::start().await;
    mount_ticker(&server, "BTC_USDT", json!({
        "id": -1,
        "method": "public/get-tickers",
        "code": 0,
        "result": {
            "data": [{
                "i": "BTC_USDT",
                "a": "65000.5",
                "h": "66000",
                "l": "64000",
                "v": "1234.5",
                "c": "0.0125",
                "t": 1_700_000_000_000u64
            }]
        }
    })).await;

    let quote = primary_for(&server).fetch(&sym("btc")).await.unwrap();

    assert_eq!(quote.symbol, sym("BTC"));
    assert_eq!(quote.price, price(65_000.5));
    assert!((quote.change_24h.unwrap() - 1.25).abs() < 1e-9);
    assert_eq!(quote.volume_24h, Some(1234.5));
    assert_eq!(quote.low_24h, Some(price(64_000.0)));
    assert_eq!(quote.observed_at.as_millis(), 1_700_000_000_000);
    assert_eq!(quote.source, SourceTag::Primary);
}

#[tokio::test]
async fn primary_reports_empty_and_error_envelopes() {
    let server = MockServer::start().await;
    mount_ticker(&server, "XYZ_USDT", json!({ "code": 0, "result": { "data": [] } })).await;
    mount_ticker(&server, "ABC_USDT", json!({ "code": 40004, "message": "invalid instrument" })).await;
    let source = primary_for(&server);

    assert_eq!(source.fetch(&sym("XYZ")).await, Err(SourceError::Empty));
    assert_eq!(
        source.fetch(&sym("ABC")).await,
        Err(SourceError::Status { code: 40004, message: "invalid instrument".to_string() })
    );
}

#[tokio::test]
async fn primary_maps_http_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let outcome = primary_for(&server).fetch(&sym("ETH")).await;
    assert_eq!(outcome, Err(SourceError::Status { code: 502, message: "bad gateway".to_string() }));
}

#[tokio::test]
async fn secondary_pulls_24h_ticker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/24hr"))
        .and(query_param("symbol", "SOLUSDT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "symbol": "SOLUSDT",
            "priceChange": "-3.10",
            "priceChangePercent": "-2.034",
            "lastPrice": "149.25",
            "highPrice": "155.00",
            "lowPrice": "147.80",
            "volume": "912345.10",
            "closeTime": 1_700_000_000_500u64
        })))
        .mount(&server)
        .await;

    let source = secondary_for(&server);
    let quote = source.fetch(&sym("SOL")).await.unwrap();

    assert_eq!(quote.price, price(149.25));
    assert_eq!(quote.change_24h, Some(-2.034));
    assert_eq!(quote.high_24h, Some(price(155.0)));
    assert_eq!(quote.source, SourceTag::Secondary);
}

#[tokio::test]
async fn secondary_flags_unknown_pairs_as_unsupported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/24hr"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": -1121,
            "msg": "Invalid symbol."
        })))
        .mount(&server)
        .await;

    let outcome = secondary_for(&server).fetch(&sym("NOPE")).await;
    assert_eq!(outcome, Err(SourceError::UnsupportedSymbol(sym("NOPE"))));
}

#[tokio::test]
async fn secondary_prefers_recent_push_updates() {
    let server = MockServer::start().await;
    let source = secondary_for(&server);
    let pushed = quote_infra::events::quote::Quote::new(sym("ETH"), price(3_001.0), SourceTag::Secondary);
    source.ingest(pushed.clone());

    assert_eq!(source.fetch(&sym("ETH")).await.unwrap(), pushed);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn slow_sources_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let source = primary_for(&server);
    let outcome = fetch_with_timeout(&source, &sym("BTC"), Duration::from_millis(100)).await;

    assert!(matches!(outcome, Err(SourceError::Timeout { ref source_name, .. }) if source_name == source.name()));
}

#[tokio::test]
async fn service_falls_back_from_http_primary_to_http_secondary() {
    let primary_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&primary_server)
        .await;

    let secondary_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/24hr"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lastPrice": "0.1234",
            "priceChangePercent": "1.5",
            "volume": "1000"
        })))
        .expect(1)
        .mount(&secondary_server)
        .await;

    let sources = vec![
        Arc::new(primary_for(&primary_server)) as Arc<dyn PriceSource>,
        Arc::new(secondary_for(&secondary_server)) as Arc<dyn PriceSource>,
    ];
    let service = PriceService::new(test_config(), sources).unwrap();

    let quote = service.get_price("CRO").await.unwrap();
    assert_eq!(quote.source, SourceTag::Secondary);
    assert_eq!(quote.price, price(0.1234));

    // second lookup is a cache hit
    service.get_price("cro").await.unwrap();
}
