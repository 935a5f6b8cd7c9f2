//! mcd-schemas
//!
//! Records shared across the engine crates: the validated `Trade`, the executed
//! `TradeLogEntry`, and the small enums/ranges they carry.
//!
//! `Trade` is immutable once built. The only constructor is [`Trade::new`],
//! which enforces the field invariants; there are no setters.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Action / origin
// ---------------------------------------------------------------------------

/// BUY or SELL.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
        }
    }

    /// Case-insensitive parse of `buy` / `sell`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(Action::Buy),
            "sell" => Some(Action::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a trade came from. Both kinds go through the same validation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeOrigin {
    #[default]
    Manual,
    Suggested,
}

impl TradeOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeOrigin::Manual => "manual",
            TradeOrigin::Suggested => "suggested",
        }
    }
}

/// Upper-case and trim a ticker symbol. Every map keyed by ticker uses this form.
pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// True when `ticker` (already normalized) only uses `[A-Z0-9.^-]` and is non-empty.
pub fn is_valid_ticker(ticker: &str) -> bool {
    !ticker.is_empty()
        && ticker
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '.' | '^' | '-'))
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// Field-level invariant violated while building a [`Trade`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradeFieldError {
    #[error("invalid ticker '{0}'")]
    Ticker(String),
    #[error("shares must be > 0 (got {0})")]
    Shares(Decimal),
    #[error("price must be > 0 when set (got {0})")]
    Price(Decimal),
    #[error("stop_loss must be > 0 when set (got {0})")]
    StopLoss(Decimal),
}

/// A proposed order, validated and immutable.
///
/// `price == None` is a market order, priced at execution time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Trade {
    ticker: String,
    action: Action,
    shares: Decimal,
    price: Option<Decimal>,
    stop_loss: Option<Decimal>,
    origin: TradeOrigin,
    asof_date: Option<NaiveDate>,
}

impl Trade {
    pub fn new(
        ticker: &str,
        action: Action,
        shares: Decimal,
        price: Option<Decimal>,
        stop_loss: Option<Decimal>,
        origin: TradeOrigin,
    ) -> Result<Self, TradeFieldError> {
        let ticker = normalize_ticker(ticker);
        if !is_valid_ticker(&ticker) {
            return Err(TradeFieldError::Ticker(ticker));
        }
        if shares <= Decimal::ZERO {
            return Err(TradeFieldError::Shares(shares));
        }
        if let Some(px) = price {
            if px <= Decimal::ZERO {
                return Err(TradeFieldError::Price(px));
            }
        }
        if let Some(sl) = stop_loss {
            if sl <= Decimal::ZERO {
                return Err(TradeFieldError::StopLoss(sl));
            }
        }
        Ok(Self {
            ticker,
            action,
            shares,
            price,
            stop_loss,
            origin,
            asof_date: None,
        })
    }

    /// Shorthand for a manual market order.
    pub fn market(ticker: &str, action: Action, shares: Decimal) -> Result<Self, TradeFieldError> {
        Self::new(ticker, action, shares, None, None, TradeOrigin::Manual)
    }

    /// Returns a copy pinned to an as-of date (historical backfill).
    pub fn with_asof(mut self, date: NaiveDate) -> Self {
        self.asof_date = Some(date);
        self
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn shares(&self) -> Decimal {
        self.shares
    }

    pub fn price(&self) -> Option<Decimal> {
        self.price
    }

    pub fn stop_loss(&self) -> Option<Decimal> {
        self.stop_loss
    }

    pub fn origin(&self) -> TradeOrigin {
        self.origin
    }

    pub fn asof_date(&self) -> Option<NaiveDate> {
        self.asof_date
    }

    pub fn is_market_order(&self) -> bool {
        self.price.is_none()
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.action, self.shares, self.ticker)?;
        match self.price {
            Some(px) => write!(f, " @ {px}"),
            None => write!(f, " @ market"),
        }
    }
}

// ---------------------------------------------------------------------------
// Trade log entry
// ---------------------------------------------------------------------------

/// One executed trade, as written to the append-only trade log.
///
/// The first columns (`timestamp, ticker, action, shares, price, cash_after`)
/// are the stable contract of the log file; the rest are context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub ticker: String,
    /// Action actually executed (a stop-loss can turn a buy into a sell).
    pub action: Action,
    pub shares: Decimal,
    /// Execution price per share.
    pub price: Decimal,
    pub cash_after: Decimal,
    pub as_of: NaiveDate,
    pub requested_action: Action,
    /// Provider name, or `limit` for explicit-price orders.
    pub price_source: String,
    /// Signed cash movement (negative for buys).
    pub cash_delta: Decimal,
    pub shares_after: Decimal,
    pub stop_loss: Option<Decimal>,
    pub stop_loss_triggered: bool,
    pub origin: TradeOrigin,
    pub run_id: Uuid,
}

impl TradeLogEntry {
    /// Signed share movement.
    pub fn shares_delta(&self) -> Decimal {
        match self.action {
            Action::Buy => self.shares,
            Action::Sell => -self.shares,
        }
    }

    pub fn notional(&self) -> Decimal {
        self.shares * self.price
    }
}

// ---------------------------------------------------------------------------
// Date range
// ---------------------------------------------------------------------------

/// Inclusive, optionally open-ended date range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, d: NaiveDate) -> bool {
        self.start.map_or(true, |s| d >= s) && self.end.map_or(true, |e| d <= e)
    }

    /// An empty range (start after end) never matches anything.
    pub fn is_inverted(&self) -> bool {
        matches!((self.start, self.end), (Some(s), Some(e)) if s > e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn action_parse_is_case_insensitive() {
        assert_eq!(Action::parse("BUY"), Some(Action::Buy));
        assert_eq!(Action::parse(" Sell "), Some(Action::Sell));
        assert_eq!(Action::parse("hold"), None);
    }

    #[test]
    fn trade_new_normalizes_ticker() {
        let t = Trade::market(" abc ", Action::Buy, dec!(10)).unwrap();
        assert_eq!(t.ticker(), "ABC");
        assert!(t.is_market_order());
    }

    #[test]
    fn trade_new_rejects_bad_fields() {
        assert_eq!(
            Trade::market("ABC", Action::Buy, dec!(0)).unwrap_err(),
            TradeFieldError::Shares(dec!(0))
        );
        assert!(matches!(
            Trade::new("ABC", Action::Sell, dec!(1), Some(dec!(-1)), None, TradeOrigin::Manual),
            Err(TradeFieldError::Price(_))
        ));
        assert!(matches!(
            Trade::market("A B", Action::Buy, dec!(1)),
            Err(TradeFieldError::Ticker(_))
        ));
        assert!(matches!(
            Trade::market("", Action::Buy, dec!(1)),
            Err(TradeFieldError::Ticker(_))
        ));
    }

    #[test]
    fn index_style_tickers_are_valid() {
        assert!(is_valid_ticker("^GSPC"));
        assert!(is_valid_ticker("BRK.B"));
        assert!(!is_valid_ticker("abc"));
    }

    #[test]
    fn date_range_contains_inclusive_bounds() {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let r = DateRange::new(Some(d("2024-01-02")), Some(d("2024-01-05")));
        assert!(r.contains(d("2024-01-02")));
        assert!(r.contains(d("2024-01-05")));
        assert!(!r.contains(d("2024-01-06")));
        assert!(DateRange::all().contains(d("1999-12-31")));
        assert!(DateRange::new(Some(d("2024-02-01")), Some(d("2024-01-01"))).is_inverted());
    }

    #[test]
    fn action_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Action::Sell).unwrap(), "\"sell\"");
        assert_eq!(serde_json::to_string(&TradeOrigin::Suggested).unwrap(), "\"suggested\"");
    }
}
