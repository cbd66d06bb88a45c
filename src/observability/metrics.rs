use lazy_static::lazy_static;
use prometheus::{
    Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use crate::error::{Error, Result};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Update metrics
    pub static ref PRICE_UPDATES_COMMITTED: IntCounter = IntCounter::new(
        "price_updates_committed_total",
        "Total number of committed aggregate prices"
    ).unwrap();

    pub static ref PRICE_UPDATES_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("price_updates_rejected_total", "Total number of rejected price updates"),
        &["reason"]
    ).unwrap();

    pub static ref FALLBACK_COMMITS: IntCounter = IntCounter::new(
        "fallback_commits_total",
        "Committed prices produced by the index fallback"
    ).unwrap();

    // Source metrics
    pub static ref SOURCES_FILTERED: IntCounterVec = IntCounterVec::new(
        Opts::new("sources_filtered_total", "Source observations excluded from an update"),
        &["reason"]
    ).unwrap();

    pub static ref ACTIVE_SOURCES: IntGauge = IntGauge::new(
        "active_sources",
        "Number of active price sources"
    ).unwrap();

    // Price metrics
    pub static ref AGGREGATE_PRICE: Gauge = Gauge::new(
        "aggregate_price",
        "Last committed aggregate price"
    ).unwrap();
}

pub fn register_metrics() -> Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(PRICE_UPDATES_COMMITTED.clone()),
        Box::new(PRICE_UPDATES_REJECTED.clone()),
        Box::new(FALLBACK_COMMITS.clone()),
        Box::new(SOURCES_FILTERED.clone()),
        Box::new(ACTIVE_SOURCES.clone()),
        Box::new(AGGREGATE_PRICE.clone()),
    ];
    for collector in collectors {
        REGISTRY.register(collector)
            .map_err(|e| Error::MetricsError(e.to_string()))?;
    }
    Ok(())
}

/// Text exposition of every registered metric.
pub fn render() -> Result<String> {
    use prometheus::Encoder;

    let mut buffer = Vec::new();
    prometheus::TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| Error::MetricsError(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| Error::MetricsError(e.to_string()))
}
