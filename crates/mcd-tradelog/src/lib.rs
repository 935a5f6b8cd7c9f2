//! mcd-tradelog
//!
//! Append-only record of executed trades. Entries are never mutated or
//! removed once written, and are kept in execution-time order.
//!
//! Two implementations:
//! - [`MemoryTradeLog`]: in-process, for tests and dry runs
//! - [`CsvTradeLog`]: `trade_log.csv`; a batch either lands whole or not at all

mod csv_log;

pub use csv_log::{CsvTradeLog, TradeLogRow, TRADE_LOG_HEADERS};

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use mcd_schemas::{DateRange, TradeLogEntry};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TradeLogError {
    #[error("trade log io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("trade log csv error: {0}")]
    Csv(String),
    #[error("trade log row {row}: cannot parse field '{field}' from value '{raw}'")]
    ParseField {
        row: usize,
        field: &'static str,
        raw: String,
    },
    /// Entries must be appended in non-decreasing timestamp order.
    #[error("out of order append: {got} is before last entry {last}")]
    OutOfOrder {
        last: DateTime<Utc>,
        got: DateTime<Utc>,
    },
}

/// Append-only trade log.
pub trait TradeLog {
    /// Append a batch atomically: on error nothing from the batch remains.
    fn append_batch(&mut self, entries: &[TradeLogEntry]) -> Result<(), TradeLogError>;

    /// Every entry whose `as_of` date falls in `range`, in write order.
    fn load(&self, range: &DateRange) -> Result<Vec<TradeLogEntry>, TradeLogError>;

    fn append(&mut self, entry: TradeLogEntry) -> Result<(), TradeLogError> {
        self.append_batch(std::slice::from_ref(&entry))
    }

    fn load_all(&self) -> Result<Vec<TradeLogEntry>, TradeLogError> {
        self.load(&DateRange::all())
    }
}

/// Check a batch against the last persisted timestamp and against itself.
pub(crate) fn check_order(last: Option<DateTime<Utc>>, entries: &[TradeLogEntry]) -> Result<(), TradeLogError> {
    let mut prev = last;
    for e in entries {
        if let Some(p) = prev {
            if e.timestamp < p {
                return Err(TradeLogError::OutOfOrder {
                    last: p,
                    got: e.timestamp,
                });
            }
        }
        prev = Some(e.timestamp);
    }
    Ok(())
}

/// In-memory trade log.
#[derive(Debug, Default, Clone)]
pub struct MemoryTradeLog {
    entries: Vec<TradeLogEntry>,
}

impl MemoryTradeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TradeLogEntry] {
        &self.entries
    }
}

impl TradeLog for MemoryTradeLog {
    fn append_batch(&mut self, entries: &[TradeLogEntry]) -> Result<(), TradeLogError> {
        check_order(self.entries.last().map(|e| e.timestamp), entries)?;
        self.entries.extend_from_slice(entries);
        Ok(())
    }

    fn load(&self, range: &DateRange) -> Result<Vec<TradeLogEntry>, TradeLogError> {
        Ok(self
            .entries
            .iter()
            .filter(|e| range.contains(e.as_of))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{NaiveDate, TimeZone, Utc};
    use mcd_schemas::{Action, TradeLogEntry, TradeOrigin};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    pub fn entry(ticker: &str, day: u32, secs: u32, shares: Decimal, price: Decimal) -> TradeLogEntry {
        TradeLogEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 3, day, 15, 0, secs).unwrap(),
            ticker: ticker.to_string(),
            action: Action::Buy,
            shares,
            price,
            cash_after: Decimal::new(1000, 0) - shares * price,
            as_of: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            requested_action: Action::Buy,
            price_source: "limit".to_string(),
            cash_delta: -(shares * price),
            shares_after: shares,
            stop_loss: None,
            stop_loss_triggered: false,
            origin: TradeOrigin::Manual,
            run_id: Uuid::nil(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::entry;
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn memory_log_filters_by_as_of_range() {
        let mut log = MemoryTradeLog::new();
        log.append(entry("AAA", 1, 0, dec!(1), dec!(10))).unwrap();
        log.append_batch(&[entry("BBB", 2, 0, dec!(2), dec!(5)), entry("CCC", 3, 0, dec!(3), dec!(1))])
            .unwrap();

        let d = |day| NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        let got = log.load(&DateRange::new(Some(d(2)), None)).unwrap();
        let tickers: Vec<_> = got.iter().map(|e| e.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["BBB", "CCC"]);
        assert_eq!(log.load_all().unwrap().len(), 3);
    }

    #[test]
    fn memory_log_rejects_out_of_order_batch_whole() {
        let mut log = MemoryTradeLog::new();
        log.append(entry("AAA", 2, 0, dec!(1), dec!(10))).unwrap();

        let err = log
            .append_batch(&[entry("BBB", 2, 5, dec!(1), dec!(1)), entry("CCC", 1, 0, dec!(1), dec!(1))])
            .unwrap_err();
        assert!(matches!(err, TradeLogError::OutOfOrder { .. }));
        assert_eq!(log.len(), 1);
    }
}
