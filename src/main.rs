use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use price_oracle::config::loader::AppConfig;
use price_oracle::interfaces::clock::{Clock, SystemClock};
use price_oracle::observability::{metrics, tracing::init_tracing};
use price_oracle::price_infra::aggregator::Aggregator;
use price_oracle::price_infra::connectors::static_source::StaticSource;
use price_oracle::types::ids::OperatorId;
use price_oracle::types::price::Price;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("ORACLE_ENV").unwrap_or_else(|_| "development".to_string());
    let app = AppConfig::load(&env).context("loading configuration")?;

    init_tracing(&app.logging)?;
    metrics::register_metrics()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let admin = app.operators.first().copied().unwrap_or_default();
    let mut aggregator = Aggregator::new(app.aggregator.clone(), admin, clock.clone())?;
    for operator in app.operators.iter().skip(1) {
        aggregator.grant_operator(admin, *operator)?;
    }

    // Standalone mode: each configured source serves its demo quote, refreshed every tick.
    let mut demo_sources = Vec::new();
    for definition in &app.sources {
        let price = Price::from_f64(definition.demo_price.unwrap_or_default());
        let source = Arc::new(StaticSource::new(price, clock.now()));
        aggregator.add_source(
            admin,
            definition.id.clone(),
            source.clone(),
            definition.weight_bps,
            definition.max_age_secs,
            definition.max_deviation_bps,
        )?;
        demo_sources.push((source, price));
    }

    tracing::info!(
        env = %env,
        sources = aggregator.get_active_source_count(),
        min_quorum = aggregator.config().min_quorum,
        "Price oracle started"
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(app.update_interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for (source, price) in &demo_sources {
                    source.set_quote(*price, clock.now());
                }
                match aggregator.update_price() {
                    Ok(updated) => tracing::debug!(price = %updated.price, "Tick committed"),
                    Err(e) => tracing::warn!(error = %e, "Tick produced no update"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    if let Ok(exposition) = metrics::render() {
        tracing::debug!("{}", exposition);
    }
    Ok(())
}
