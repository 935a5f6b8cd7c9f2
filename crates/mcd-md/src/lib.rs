//! mcd-md
//!
//! Market-data acquisition: an ordered chain of quote sources (primary first,
//! then fallbacks) behind a per-key locked cache.
//!
//! This crate does **not** read configuration or touch the filesystem; the CLI
//! builds the source list from config and hands it to [`MarketDataProvider`].

pub mod alphavantage;
pub mod cache;
pub mod source;
pub mod yahoo;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use alphavantage::AlphaVantageSource;
pub use cache::{PriceCache, QuoteKey};
pub use source::{QuoteSource, SourceError};
pub use yahoo::YahooChartSource;

/// Whether a quote came from the first source in the chain or a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteOrigin {
    Primary,
    Fallback,
}

impl QuoteOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteOrigin::Primary => "primary",
            QuoteOrigin::Fallback => "fallback",
        }
    }
}

/// The authoritative price of a ticker for one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub ticker: String,
    pub date: NaiveDate,
    /// Always > 0.
    pub price: Decimal,
    pub origin: QuoteOrigin,
    /// Name of the source that produced the price.
    pub source: String,
}

/// One source's failure inside a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub error: SourceError,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.error)
    }
}

/// Every source in the chain failed for (ticker, date).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("data unavailable for {ticker} on {date}: {}", describe_failures(.failures))]
pub struct DataUnavailable {
    pub ticker: String,
    pub date: NaiveDate,
    pub failures: Vec<SourceFailure>,
}

fn describe_failures(failures: &[SourceFailure]) -> String {
    if failures.is_empty() {
        return "no quote sources configured".to_string();
    }
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fallback chain + cache.
///
/// `get_price` checks the cache, then tries each source in order with a
/// bounded timeout. One attempt per source; no retries against the same
/// source.
pub struct MarketDataProvider {
    sources: Vec<Arc<dyn QuoteSource>>,
    cache: PriceCache,
    timeout: Duration,
}

impl MarketDataProvider {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// `sources[0]` is the primary; everything after it is a fallback.
    pub fn new(sources: Vec<Arc<dyn QuoteSource>>) -> Self {
        Self {
            sources,
            cache: PriceCache::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    /// Price for (ticker, date). Fails only when every source failed.
    pub async fn get_price(&self, ticker: &str, date: NaiveDate) -> Result<PriceQuote, DataUnavailable> {
        let key = QuoteKey::new(ticker, date);
        self.cache.get_or_fetch(&key, || self.fetch_chain(&key)).await
    }

    /// Evict one ticker (all dates) or the whole cache.
    pub async fn clear_cache(&self, ticker: Option<&str>) -> usize {
        let evicted = self.cache.clear(ticker).await;
        tracing::info!(ticker = ticker.unwrap_or("*"), evicted, "price cache cleared");
        evicted
    }

    async fn fetch_chain(&self, key: &QuoteKey) -> Result<PriceQuote, DataUnavailable> {
        let mut failures: Vec<SourceFailure> = Vec::new();

        for (idx, source) in self.sources.iter().enumerate() {
            match self.quote_once(source.as_ref(), key).await {
                Ok(price) => {
                    let origin = if idx == 0 {
                        QuoteOrigin::Primary
                    } else {
                        QuoteOrigin::Fallback
                    };
                    if origin == QuoteOrigin::Fallback {
                        tracing::warn!(
                            ticker = %key.ticker,
                            date = %key.date,
                            source = source.name(),
                            "priced from fallback source"
                        );
                    } else {
                        tracing::debug!(ticker = %key.ticker, date = %key.date, %price, "priced from primary");
                    }
                    return Ok(PriceQuote {
                        ticker: key.ticker.clone(),
                        date: key.date,
                        price,
                        origin,
                        source: source.name().to_string(),
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        ticker = %key.ticker,
                        date = %key.date,
                        source = source.name(),
                        %error,
                        "quote source failed"
                    );
                    failures.push(SourceFailure {
                        source: source.name().to_string(),
                        error,
                    });
                }
            }
        }

        Err(DataUnavailable {
            ticker: key.ticker.clone(),
            date: key.date,
            failures,
        })
    }

    async fn quote_once(&self, source: &dyn QuoteSource, key: &QuoteKey) -> Result<Decimal, SourceError> {
        let price = tokio::time::timeout(self.timeout, source.quote(&key.ticker, key.date))
            .await
            .map_err(|_| SourceError::Timeout {
                millis: self.timeout.as_millis() as u64,
            })??;
        if price <= Decimal::ZERO {
            return Err(SourceError::InvalidPrice(price));
        }
        Ok(price)
    }
}
