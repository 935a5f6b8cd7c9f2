//! File-backed trade log (`trade_log.csv`).
//!
//! ## Column contract
//!
//! | Column                | Example                                |
//! |-----------------------|----------------------------------------|
//! | `timestamp`           | `2024-03-04T15:00:00Z`                 |
//! | `ticker`              | `ABC`                                  |
//! | `action`              | `buy` / `sell` (executed)              |
//! | `shares`              | `10`                                   |
//! | `price`               | `12.34`                                |
//! | `cash_after`          | `876.60`                               |
//! | `as_of`               | `2024-03-04`                           |
//! | `requested_action`    | `buy` / `sell`                         |
//! | `price_source`        | `limit` / provider name                |
//! | `cash_delta`          | `-123.40`                              |
//! | `shares_after`        | `10`                                   |
//! | `stop_loss`           | empty or decimal                       |
//! | `stop_loss_triggered` | `true` / `false`                       |
//! | `origin`              | `manual` / `suggested`                 |
//! | `run_id`              | uuid                                   |
//!
//! Decimals stay strings on disk and are parsed exactly; no floats.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use mcd_schemas::{Action, DateRange, TradeLogEntry, TradeOrigin};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{check_order, TradeLog, TradeLogError};

pub const TRADE_LOG_HEADERS: [&str; 15] = [
    "timestamp",
    "ticker",
    "action",
    "shares",
    "price",
    "cash_after",
    "as_of",
    "requested_action",
    "price_source",
    "cash_delta",
    "shares_after",
    "stop_loss",
    "stop_loss_triggered",
    "origin",
    "run_id",
];

/// One CSV row, as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeLogRow {
    pub timestamp: DateTime<Utc>,
    pub ticker: String,
    pub action: Action,
    pub shares: String,
    pub price: String,
    pub cash_after: String,
    pub as_of: NaiveDate,
    pub requested_action: Action,
    pub price_source: String,
    pub cash_delta: String,
    pub shares_after: String,
    #[serde(default)]
    pub stop_loss: String,
    pub stop_loss_triggered: bool,
    pub origin: TradeOrigin,
    pub run_id: Uuid,
}

impl From<&TradeLogEntry> for TradeLogRow {
    fn from(e: &TradeLogEntry) -> Self {
        Self {
            timestamp: e.timestamp,
            ticker: e.ticker.clone(),
            action: e.action,
            shares: e.shares.to_string(),
            price: e.price.to_string(),
            cash_after: e.cash_after.to_string(),
            as_of: e.as_of,
            requested_action: e.requested_action,
            price_source: e.price_source.clone(),
            cash_delta: e.cash_delta.to_string(),
            shares_after: e.shares_after.to_string(),
            stop_loss: e.stop_loss.map(|s| s.to_string()).unwrap_or_default(),
            stop_loss_triggered: e.stop_loss_triggered,
            origin: e.origin,
            run_id: e.run_id,
        }
    }
}

fn parse_dec(row: usize, field: &'static str, raw: &str) -> Result<Decimal, TradeLogError> {
    Decimal::from_str(raw.trim()).map_err(|_| TradeLogError::ParseField {
        row,
        field,
        raw: raw.to_string(),
    })
}

impl TradeLogRow {
    /// `row` is the 1-based data row number, used in error messages.
    pub fn into_entry(self, row: usize) -> Result<TradeLogEntry, TradeLogError> {
        let stop_loss = if self.stop_loss.trim().is_empty() {
            None
        } else {
            Some(parse_dec(row, "stop_loss", &self.stop_loss)?)
        };
        Ok(TradeLogEntry {
            timestamp: self.timestamp,
            shares: parse_dec(row, "shares", &self.shares)?,
            price: parse_dec(row, "price", &self.price)?,
            cash_after: parse_dec(row, "cash_after", &self.cash_after)?,
            cash_delta: parse_dec(row, "cash_delta", &self.cash_delta)?,
            shares_after: parse_dec(row, "shares_after", &self.shares_after)?,
            ticker: self.ticker,
            action: self.action,
            as_of: self.as_of,
            requested_action: self.requested_action,
            price_source: self.price_source,
            stop_loss,
            stop_loss_triggered: self.stop_loss_triggered,
            origin: self.origin,
            run_id: self.run_id,
        })
    }
}

/// Append-only CSV trade log.
#[derive(Debug, Clone)]
pub struct CsvTradeLog {
    path: PathBuf,
}

impl CsvTradeLog {
    /// Opens (lazily) the log at `path` and ensures parent dirs exist.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, TradeLogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| TradeLogError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> TradeLogError {
        TradeLogError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Current byte length; 0 when the file does not exist yet.
    pub fn byte_len(&self) -> Result<u64, TradeLogError> {
        match fs::metadata(&self.path) {
            Ok(m) => Ok(m.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(self.io_err(e)),
        }
    }

    /// Cut the file back to `len` bytes. Only ever used to undo a batch that
    /// was appended in the same commit; never reaches earlier history.
    pub fn truncate_to(&self, len: u64) -> Result<(), TradeLogError> {
        if len == 0 && !self.path.exists() {
            return Ok(());
        }
        let f = OpenOptions::new().write(true).open(&self.path).map_err(|e| self.io_err(e))?;
        f.set_len(len).map_err(|e| self.io_err(e))?;
        f.sync_all().map_err(|e| self.io_err(e))
    }

    fn read_entries(&self) -> Result<Vec<TradeLogEntry>, TradeLogError> {
        if self.byte_len()? == 0 {
            return Ok(Vec::new());
        }
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| TradeLogError::Csv(e.to_string()))?;

        let headers = rdr.headers().map_err(|e| TradeLogError::Csv(e.to_string()))?.clone();
        for required in &TRADE_LOG_HEADERS[..6] {
            if !headers.iter().any(|h| h == *required) {
                return Err(TradeLogError::Csv(format!("missing required header column '{required}'")));
            }
        }

        let mut out = Vec::new();
        for (i, rec) in rdr.deserialize::<TradeLogRow>().enumerate() {
            let row = rec.map_err(|e| TradeLogError::Csv(e.to_string()))?;
            out.push(row.into_entry(i + 1)?);
        }
        Ok(out)
    }

    fn encode(entries: &[TradeLogEntry], with_header: bool) -> Result<Vec<u8>, TradeLogError> {
        let mut w = csv::WriterBuilder::new().has_headers(with_header).from_writer(Vec::new());
        for e in entries {
            w.serialize(TradeLogRow::from(e))
                .map_err(|err| TradeLogError::Csv(err.to_string()))?;
        }
        w.into_inner().map_err(|err| TradeLogError::Csv(err.to_string()))
    }

    fn write_at_end(&self, bytes: &[u8]) -> Result<(), TradeLogError> {
        let mut f: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        f.write_all(bytes).map_err(|e| self.io_err(e))?;
        f.sync_all().map_err(|e| self.io_err(e))
    }
}

impl TradeLog for CsvTradeLog {
    fn append_batch(&mut self, entries: &[TradeLogEntry]) -> Result<(), TradeLogError> {
        if entries.is_empty() {
            return Ok(());
        }
        let existing = self.read_entries()?;
        check_order(existing.last().map(|e| e.timestamp), entries)?;

        let prev_len = self.byte_len()?;
        let bytes = Self::encode(entries, prev_len == 0)?;

        if let Err(e) = self.write_at_end(&bytes) {
            tracing::warn!(path = %self.path.display(), error = %e, "trade log append failed; rolling back");
            self.truncate_to(prev_len)?;
            return Err(e);
        }

        tracing::debug!(path = %self.path.display(), rows = entries.len(), "trade log batch appended");
        Ok(())
    }

    fn load(&self, range: &DateRange) -> Result<Vec<TradeLogEntry>, TradeLogError> {
        Ok(self
            .read_entries()?
            .into_iter()
            .filter(|e| range.contains(e.as_of))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::entry;
    use rust_decimal_macros::dec;

    #[test]
    fn csv_log_round_trips_and_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("trade_log.csv");
        let mut log = CsvTradeLog::new(&path).unwrap();

        let mut first = entry("AAA", 1, 0, dec!(1.5), dec!(10.125));
        first.stop_loss = Some(dec!(9.5));
        log.append(first.clone()).unwrap();
        log.append_batch(&[entry("BBB", 2, 0, dec!(2), dec!(5))]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("timestamp,ticker,action").count(), 1);
        assert!(text.starts_with(&TRADE_LOG_HEADERS.join(",")));

        let all = log.load_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], first);
        assert_eq!(all[1].ticker, "BBB");
    }

    #[test]
    fn truncate_to_drops_only_the_tail() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = CsvTradeLog::new(dir.path().join("trade_log.csv")).unwrap();
        log.append(entry("AAA", 1, 0, dec!(1), dec!(1))).unwrap();
        let len = log.byte_len().unwrap();

        log.append(entry("BBB", 1, 1, dec!(1), dec!(1))).unwrap();
        log.truncate_to(len).unwrap();

        let all = log.load_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].ticker, "AAA");
    }

    #[test]
    fn bad_decimal_reports_row_and_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trade_log.csv");
        let mut log = CsvTradeLog::new(&path).unwrap();
        log.append(entry("AAA", 1, 0, dec!(1), dec!(1))).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let broken = text.replacen("AAA,buy,1,", "AAA,buy,one,", 1);
        fs::write(&path, broken).unwrap();

        match log.load_all().unwrap_err() {
            TradeLogError::ParseField { row, field, raw } => {
                assert_eq!((row, field, raw.as_str()), (1, "shares", "one"));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = CsvTradeLog::new(dir.path().join("none.csv")).unwrap();
        assert!(log.load_all().unwrap().is_empty());
        assert_eq!(log.byte_len().unwrap(), 0);
    }
}
