use tracing::Span;
use tracing_subscriber::EnvFilter;
use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use crate::types::ids::OperatorId;
use crate::types::timestamp::Timestamp;

pub fn trace_aggregation(active_sources: usize, now: Timestamp) -> Span {
    tracing::info_span!(
        "aggregation",
        active_sources,
        now = now.as_secs(),
    )
}

pub fn trace_governance(action: &'static str, caller: OperatorId) -> Span {
    tracing::info_span!(
        "governance",
        action,
        caller = %caller,
    )
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over the configured filter.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| Error::ConfigError(format!("invalid log filter: {}", e)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| Error::ConfigError(format!("tracing already initialized: {}", e)))
}
