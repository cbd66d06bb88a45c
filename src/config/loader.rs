use crate::config::{AggregatorConfig, LoggingConfig, SourceDefinition};
use crate::error::{Error, Result};
use crate::types::ids::OperatorId;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub sources: Vec<SourceDefinition>,
    #[serde(default)]
    pub operators: Vec<OperatorId>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,
}

fn default_update_interval_secs() -> u64 {
    60
}

impl AppConfig {
    /// Layers `config/default`, `config/{env}` and `ORACLE_*` variables.
    /// Nested keys use `__`, e.g. `ORACLE_AGGREGATOR__MIN_QUORUM=5`.
    pub fn load(env: &str) -> Result<Self> {
        Self::load_with(env, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix("ORACLE")
            .prefix_separator("_")
            .separator("__")
    }

    fn load_with(env: &str, environment: Environment) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(environment)
            .build()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        let app: AppConfig = config.try_deserialize()
            .map_err(|e| Error::ConfigError(e.to_string()))?;
        app.validate()?;
        Ok(app)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        let app: AppConfig = config.try_deserialize()
            .map_err(|e| Error::ConfigError(e.to_string()))?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<()> {
        self.aggregator.validate()?;
        for source in &self.sources {
            source.validate()?;
        }
        if self.update_interval_secs == 0 {
            return Err(Error::ConfigError("update_interval_secs must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price_infra::admission::StaleCommitPolicy;

    #[test]
    fn test_parse_toml() {
        let app = AppConfig::from_toml_str(r#"
            update_interval_secs = 30

            [aggregator]
            min_quorum = 2
            stale_commit_policy = "allow"

            [[sources]]
            id = "alpha"
            weight_bps = 5000
            max_age_secs = 120
            max_deviation_bps = 300
            demo_price = 101.5
        "#).unwrap();

        assert_eq!(app.update_interval_secs, 30);
        assert_eq!(app.aggregator.min_quorum, 2);
        assert_eq!(app.aggregator.aggregate_max_age_secs, 3_600);
        assert_eq!(app.aggregator.stale_commit_policy, StaleCommitPolicy::Allow);
        assert_eq!(app.sources.len(), 1);
        assert_eq!(app.sources[0].id.as_str(), "alpha");
        assert_eq!(app.sources[0].demo_price, Some(101.5));
        assert!(app.operators.is_empty());
    }

    #[test]
    fn test_env_overrides_default_file() {
        let vars: std::collections::HashMap<String, String> = [
            ("ORACLE_AGGREGATOR__MIN_QUORUM", "5"),
            ("ORACLE_UPDATE_INTERVAL_SECS", "15"),
            ("ORACLE_ENV", "staging"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let app = AppConfig::load_with("missing-env", AppConfig::environment().source(Some(vars))).unwrap();
        assert_eq!(app.aggregator.min_quorum, 5);
        assert_eq!(app.update_interval_secs, 15);
        assert_eq!(app.aggregator.aggregate_max_age_secs, 3_600);
        assert_eq!(app.sources.len(), 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = AppConfig::from_toml_str(r#"
            [aggregator]
            max_deviation_from_twap_bps = 9000
        "#);
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }
}
