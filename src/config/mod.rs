use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::price_infra::admission::StaleCommitPolicy;
use crate::types::ids::SourceId;

pub mod loader;

pub const MIN_QUORUM_RANGE: (u64, u64) = (1, 10);
pub const MAX_AGE_RANGE: (u64, u64) = (1, 86_400);
pub const AGGREGATE_MAX_AGE_RANGE: (u64, u64) = (0, 86_400);
pub const WEIGHT_RANGE: (u64, u64) = (1, 10_000);
pub const DEVIATION_RANGE: (u64, u64) = (0, 5_000);

/// Rejects `value` outside `range` (inclusive) with `Error::InvalidParameter`.
pub fn check_range(parameter: &'static str, value: u64, range: (u64, u64)) -> Result<()> {
    let (min, max) = range;
    if value < min || value > max {
        return Err(Error::InvalidParameter { parameter, value, min, max });
    }
    Ok(())
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub min_quorum: u8,
    /// Zero disables the aggregate staleness check.
    pub aggregate_max_age_secs: u64,
    pub max_deviation_from_twap_bps: u32,
    pub fallback_min_quorum: u8,
    pub stale_commit_policy: StaleCommitPolicy,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            min_quorum: 3,
            aggregate_max_age_secs: 3_600,  // 1 hour
            max_deviation_from_twap_bps: 1_000,  // 10%
            fallback_min_quorum: 3,
            stale_commit_policy: StaleCommitPolicy::Reject,
        }
    }
}

impl AggregatorConfig {
    pub fn validate(&self) -> Result<()> {
        check_range("min_quorum", self.min_quorum as u64, MIN_QUORUM_RANGE)?;
        check_range("aggregate_max_age_secs", self.aggregate_max_age_secs, AGGREGATE_MAX_AGE_RANGE)?;
        check_range("max_deviation_from_twap_bps", self.max_deviation_from_twap_bps as u64, DEVIATION_RANGE)?;
        check_range("fallback_min_quorum", self.fallback_min_quorum as u64, MIN_QUORUM_RANGE)?;
        Ok(())
    }
}

/// Source parameters as they appear in configuration files.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SourceDefinition {
    pub id: SourceId,
    pub weight_bps: u32,
    pub max_age_secs: u64,
    pub max_deviation_bps: u32,
    /// Quote served by the built-in static source when running standalone.
    #[serde(default)]
    pub demo_price: Option<f64>,
}

impl SourceDefinition {
    pub fn validate(&self) -> Result<()> {
        check_range("weight_bps", self.weight_bps as u64, WEIGHT_RANGE)?;
        check_range("max_age_secs", self.max_age_secs, MAX_AGE_RANGE)?;
        check_range("max_deviation_bps", self.max_deviation_bps as u64, DEVIATION_RANGE)?;
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AggregatorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_quorum() {
        let config = AggregatorConfig { min_quorum: 11, ..Default::default() };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidParameter { parameter: "min_quorum", value: 11, .. })
        ));
    }

    #[test]
    fn test_source_definition_bounds() {
        let definition = SourceDefinition {
            id: SourceId::from("feed"),
            weight_bps: 10_001,
            max_age_secs: 60,
            max_deviation_bps: 100,
            demo_price: None,
        };
        assert!(definition.validate().is_err());
    }
}
