use lazy_static::lazy_static;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Once;
use crate::error::Result;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Cache metrics
    pub static ref CACHE_LOOKUPS: IntCounterVec = IntCounterVec::new(
        Opts::new("price_cache_lookups_total", "Price cache lookups by outcome"),
        &["outcome"]
    ).expect("valid metric definition");

    // Resolution metrics
    pub static ref RESOLUTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("price_resolutions_total", "Resolved prices by serving tier"),
        &["tier"]
    ).expect("valid metric definition");

    pub static ref NO_PRICE_AVAILABLE: IntCounter = IntCounter::new(
        "price_no_price_available_total",
        "Resolutions that exhausted every tier"
    ).expect("valid metric definition");

    pub static ref INFLIGHT_REQUESTS: IntGauge = IntGauge::new(
        "price_inflight_requests",
        "Symbols with an outstanding upstream resolution"
    ).expect("valid metric definition");

    // Source metrics
    pub static ref SOURCE_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("price_source_failures_total", "Source adapter failures"),
        &["source", "kind"]
    ).expect("valid metric definition");

    pub static ref SOURCE_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "price_source_latency_seconds",
            "Source adapter call latency"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 1.5, 3.0]),
        &["source"]
    ).expect("valid metric definition");

    // Feed metrics
    pub static ref FEED_RECONNECT_ATTEMPTS: IntCounter = IntCounter::new(
        "price_feed_reconnect_attempts_total",
        "Connection attempts made by the feed manager"
    ).expect("valid metric definition");

    pub static ref FEED_CONNECTION_LOST: IntCounter = IntCounter::new(
        "price_feed_connection_lost_total",
        "Times the feed gave up reconnecting"
    ).expect("valid metric definition");
}

static REGISTER: Once = Once::new();

/// Registers every collector with `REGISTRY`. Safe to call more than once.
pub fn register_metrics() -> Result<()> {
    let mut outcome = Ok(());
    REGISTER.call_once(|| {
        outcome = register_all();
    });
    outcome
}

fn register_all() -> Result<()> {
    REGISTRY.register(Box::new(CACHE_LOOKUPS.clone()))?;
    REGISTRY.register(Box::new(RESOLUTIONS.clone()))?;
    REGISTRY.register(Box::new(NO_PRICE_AVAILABLE.clone()))?;
    REGISTRY.register(Box::new(INFLIGHT_REQUESTS.clone()))?;
    REGISTRY.register(Box::new(SOURCE_FAILURES.clone()))?;
    REGISTRY.register(Box::new(SOURCE_LATENCY.clone()))?;
    REGISTRY.register(Box::new(FEED_RECONNECT_ATTEMPTS.clone()))?;
    REGISTRY.register(Box::new(FEED_CONNECTION_LOST.clone()))?;
    Ok(())
}

/// Text exposition of the registry
pub fn gather_text() -> Result<String> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| crate::error::Error::MetricsError(e.to_string()))
}
