//! Quote-source boundary.
//!
//! This module defines **only** the source trait and its error type.
//! Concrete HTTP sources live in `yahoo.rs` / `alphavantage.rs`; fallback and
//! caching live in `lib.rs` / `cache.rs`.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that a [`QuoteSource`] implementation may return.
///
/// Every variant is a "source failure": the provider reacts to all of them the
/// same way, by moving on to the next source in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Network or transport failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The upstream API returned an application-level error.
    #[error("{}", api_message(.code, .message))]
    Api { code: Option<i64>, message: String },
    /// A response payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Unknown symbol, or no bar on/before the requested date.
    #[error("no data for {ticker} on or before {date}")]
    NotFound { ticker: String, date: NaiveDate },
    /// The source did not answer within the provider's timeout.
    #[error("timed out after {millis}ms")]
    Timeout { millis: u64 },
    /// The source answered with a zero/negative price.
    #[error("invalid price {0}")]
    InvalidPrice(Decimal),
    /// A required configuration value (e.g. API key) is missing or invalid.
    #[error("config error: {0}")]
    Config(String),
}

fn api_message(code: &Option<i64>, message: &str) -> String {
    match code {
        Some(c) => format!("provider api error code={c}: {message}"),
        None => format!("provider api error: {message}"),
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::Decode(e.to_string())
        } else {
            SourceError::Transport(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Source trait
// ---------------------------------------------------------------------------

/// Capability interface for one upstream price source.
///
/// Implementations must be object-safe (`Arc<dyn QuoteSource>`) and
/// `Send + Sync` so a provider can be shared across request handlers.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Stable name used in quotes, logs and error reports (e.g. `"yahoo"`).
    fn name(&self) -> &str;

    /// Closing price of `ticker` for `date` (or the most recent trading day
    /// before it). `ticker` is already normalized.
    async fn quote(&self, ticker: &str, date: NaiveDate) -> Result<Decimal, SourceError>;
}
