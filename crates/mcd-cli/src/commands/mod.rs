//! Command handler modules for the `mcd` binary.
//!
//! Shared wiring (config, data directory, market data) lives here; command
//! logic lives in the submodules.

pub mod accounting;
pub mod portfolio;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use mcd_config::{report_unused_keys, AppConfig, ProviderKind, ResolvedSecrets, UnusedKeyPolicy};
use mcd_md::{AlphaVantageSource, MarketDataProvider, QuoteSource, YahooChartSource};
use mcd_store::DataDir;
use rust_decimal::Decimal;

/// Used when no `--config` is given and the file exists.
pub const DEFAULT_CONFIG_PATH: &str = "config/defaults/base.yaml";

/// Everything a data-directory command needs.
pub struct Ctx {
    pub app: AppConfig,
    pub secrets: ResolvedSecrets,
    pub data: DataDir,
}

impl Ctx {
    pub fn load(config_paths: &[String], data_dir: Option<&str>) -> Result<Self> {
        let mut paths: Vec<&str> = config_paths.iter().map(String::as_str).collect();
        if paths.is_empty() && Path::new(DEFAULT_CONFIG_PATH).exists() {
            paths.push(DEFAULT_CONFIG_PATH);
        }
        let loaded = mcd_config::load_layered_yaml(&paths)?;

        let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
        for p in &report.unused_leaf_pointers {
            tracing::warn!(pointer = %p, "config key is not used");
        }

        let mut app = loaded.app()?;
        if let Some(d) = data_dir {
            app.engine.data_dir = PathBuf::from(d);
        }
        let secrets = mcd_config::resolve_secrets(&app);
        let data = DataDir::open(&app.engine.data_dir)
            .with_context(|| format!("open data dir failed: {}", app.engine.data_dir.display()))?;

        tracing::debug!(config_hash = %loaded.config_hash, data_dir = %data.root().display(), "config loaded");
        Ok(Self { app, secrets, data })
    }

    /// Quote sources in configured order. A provider whose key is missing is
    /// skipped with a warning rather than failing every request.
    pub fn market_data(&self) -> Result<Arc<MarketDataProvider>> {
        let mut sources: Vec<Arc<dyn QuoteSource>> = Vec::new();
        for p in &self.app.data.providers {
            match p.kind {
                ProviderKind::Yahoo => sources.push(Arc::new(match &p.base_url {
                    Some(url) => YahooChartSource::new_with_base_url(url.clone()),
                    None => YahooChartSource::new(),
                })),
                ProviderKind::AlphaVantage => {
                    let key = match self.secrets.require(ProviderKind::AlphaVantage) {
                        Ok(k) => k.to_string(),
                        Err(e) => {
                            tracing::warn!(error = %e, "alphavantage provider skipped");
                            continue;
                        }
                    };
                    sources.push(Arc::new(match &p.base_url {
                        Some(url) => AlphaVantageSource::new_with_base_url(Some(key), url.clone()),
                        None => AlphaVantageSource::new(Some(key)),
                    }));
                }
            }
        }
        if sources.is_empty() {
            anyhow::bail!("no usable quote sources configured (data.providers)");
        }
        let md = MarketDataProvider::new(sources)
            .with_timeout(Duration::from_millis(self.app.data.request_timeout_ms));
        Ok(Arc::new(md))
    }
}

/// `YYYY-MM-DD`, or today (UTC) when absent.
pub fn parse_date_or_today(raw: Option<&str>) -> Result<NaiveDate> {
    match raw {
        Some(s) => parse_date(s),
        None => Ok(Utc::now().date_naive()),
    }
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").with_context(|| format!("invalid date '{raw}' (expected YYYY-MM-DD)"))
}

pub fn parse_opt_date(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    raw.map(parse_date).transpose()
}

pub fn parse_decimal(label: &str, raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim()).with_context(|| format!("invalid {label} '{raw}'"))
}

/// Read a UTF-8 text file, tolerating a BOM.
pub fn read_text(path: &str) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("read failed: {path}"))?;
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
    String::from_utf8(bytes.to_vec()).with_context(|| format!("{path} must be UTF-8 text"))
}
