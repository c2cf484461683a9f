use anyhow::Context;
use quote_infra::config::AppConfig;
use quote_infra::observability::metrics::register_metrics;
use quote_infra::observability::tracing::init_tracing;
use quote_infra::PriceService;
use std::time::Duration;

const REPORT_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut env = String::from("development");
    let mut print_config = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--print-config" => print_config = true,
            other => env = other.to_string(),
        }
    }

    let config = AppConfig::load(&env)
        .with_context(|| format!("loading configuration for {}", env))?;

    if print_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    init_tracing(&config.logging)?;
    register_metrics()?;

    let watchlist = config.feed.subscriptions.clone();
    let service = PriceService::from_config(config)?;
    service.start().await?;

    let mut report = tokio::time::interval(REPORT_INTERVAL);
    loop {
        tokio::select! {
            _ = report.tick() => {
                let prices = service.get_prices(&watchlist).await;
                for quote in prices.values() {
                    tracing::info!("{}", quote);
                }
                let health = service.health().await;
                tracing::info!(
                    feed = ?health.feed_state,
                    fresh = health.cache.fresh,
                    stale = health.cache.stale,
                    "Resolved {}/{} symbols",
                    prices.len(),
                    watchlist.len()
                );
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("waiting for ctrl-c")?;
                tracing::info!("Shutdown requested");
                break;
            }
        }
    }

    service.stop().await?;
    Ok(())
}
