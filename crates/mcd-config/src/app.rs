use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Typed application config. Every section and field has a default, so an
/// empty document is a valid config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub data: DataConfig,
    pub execution: ExecutionConfig,
    pub performance: PerformanceConfig,
}

impl AppConfig {
    pub fn from_json(v: &Value) -> Result<Self> {
        serde_json::from_value(v.clone()).context("config does not match the expected shape")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub benchmark: String,
    /// Fixed benchmark baseline date; the first recorded date when unset.
    pub baseline_date: Option<NaiveDate>,
    pub initial_cash: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            benchmark: "SPY".to_string(),
            baseline_date: None,
            initial_cash: Decimal::from(10_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Per-source request bound.
    pub request_timeout_ms: u64,
    /// Tried in order; the first is the primary source.
    pub providers: Vec<ProviderConfig>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            providers: vec![
                ProviderConfig {
                    kind: ProviderKind::Yahoo,
                    base_url: None,
                    api_key_env: None,
                },
                ProviderConfig {
                    kind: ProviderKind::AlphaVantage,
                    base_url: None,
                    api_key_env: Some("ALPHAVANTAGE_API_KEY".to_string()),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Yahoo,
    #[serde(alias = "alpha_vantage")]
    AlphaVantage,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Yahoo => "yahoo",
            ProviderKind::AlphaVantage => "alphavantage",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the env var holding the API key, never the key itself.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Run a stop-loss check over every holding after each batch.
    pub sweep_stop_losses: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { sweep_stop_losses: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub baseline_equity: Decimal,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            baseline_equity: Decimal::ONE_HUNDRED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_layered_yaml_from_strings;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_config_is_all_defaults() {
        let app = load_layered_yaml_from_strings(&[]).unwrap().app().unwrap();
        assert_eq!(app, AppConfig::default());
        assert_eq!(app.engine.benchmark, "SPY");
        assert_eq!(app.engine.initial_cash, dec!(10000));
        assert_eq!(app.data.providers[0].kind, ProviderKind::Yahoo);
        assert!(app.execution.sweep_stop_losses);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let yaml = r#"
engine:
  benchmark: IWM
  baseline_date: 2024-01-02
  initial_cash: 2500.50
data:
  providers:
    - kind: alpha_vantage
      api_key_env: AV_KEY
"#;
        let app = load_layered_yaml_from_strings(&[yaml]).unwrap().app().unwrap();
        assert_eq!(app.engine.benchmark, "IWM");
        assert_eq!(app.engine.baseline_date, NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(app.engine.initial_cash, dec!(2500.50));
        assert_eq!(app.engine.data_dir, PathBuf::from("data"));
        assert_eq!(app.data.request_timeout_ms, 10_000);
        assert_eq!(app.data.providers.len(), 1);
        assert_eq!(app.data.providers[0].kind, ProviderKind::AlphaVantage);
        assert_eq!(app.performance.baseline_equity, dec!(100));
    }

    #[test]
    fn unknown_provider_kind_is_an_error() {
        let yaml = "data:\n  providers:\n    - kind: bloomberg\n";
        assert!(load_layered_yaml_from_strings(&[yaml]).unwrap().app().is_err());
    }
}
