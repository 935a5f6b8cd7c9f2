//! `equity_history.csv`, one row per recorded valuation date.

use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use mcd_accounting::{EquityHistory, EquityRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::PersistenceError;

pub const EQUITY_HEADERS: [&str; 8] = [
    "date",
    "cash",
    "holdings_value",
    "total_equity",
    "daily_pnl",
    "cumulative_pnl",
    "benchmark_ticker",
    "benchmark_price",
];

#[derive(Debug, Serialize, Deserialize)]
struct EquityRow {
    date: NaiveDate,
    cash: String,
    holdings_value: String,
    total_equity: String,
    daily_pnl: String,
    cumulative_pnl: String,
    #[serde(default)]
    benchmark_ticker: String,
    #[serde(default)]
    benchmark_price: String,
}

impl From<&EquityRecord> for EquityRow {
    fn from(r: &EquityRecord) -> Self {
        Self {
            date: r.date,
            cash: r.cash.to_string(),
            holdings_value: r.holdings_value.to_string(),
            total_equity: r.total_equity.to_string(),
            daily_pnl: r.daily_pnl.to_string(),
            cumulative_pnl: r.cumulative_pnl.to_string(),
            benchmark_ticker: r.benchmark_ticker.clone().unwrap_or_default(),
            benchmark_price: r.benchmark_price.map(|p| p.to_string()).unwrap_or_default(),
        }
    }
}

impl EquityRow {
    fn into_record(self, row: usize) -> Result<EquityRecord, PersistenceError> {
        let dec = |field: &str, raw: &str| {
            Decimal::from_str(raw).map_err(|_| PersistenceError::Invalid {
                row,
                reason: format!("{field}: cannot parse '{raw}'"),
            })
        };
        Ok(EquityRecord {
            date: self.date,
            cash: dec("cash", &self.cash)?,
            holdings_value: dec("holdings_value", &self.holdings_value)?,
            total_equity: dec("total_equity", &self.total_equity)?,
            daily_pnl: dec("daily_pnl", &self.daily_pnl)?,
            cumulative_pnl: dec("cumulative_pnl", &self.cumulative_pnl)?,
            benchmark_price: match self.benchmark_price.as_str() {
                "" => None,
                raw => Some(dec("benchmark_price", raw)?),
            },
            benchmark_ticker: Some(self.benchmark_ticker).filter(|t| !t.is_empty()),
        })
    }
}

/// Load the history; a missing or empty file is an empty history.
pub fn read_history(path: &Path) -> Result<EquityHistory, PersistenceError> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(EquityHistory::new()),
        Err(e) => return Err(PersistenceError::io(path, e)),
    };
    if text.trim().is_empty() {
        return Ok(EquityHistory::new());
    }

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let mut records = Vec::new();
    for (i, row) in rdr.deserialize::<EquityRow>().enumerate() {
        let row = row.map_err(|e| PersistenceError::Csv(e.to_string()))?;
        records.push(row.into_record(i + 1)?);
    }
    Ok(EquityHistory::from_records(records)?)
}

/// Encode the whole history, header included.
pub fn encode_history(history: &EquityHistory) -> Result<Vec<u8>, PersistenceError> {
    let mut w = csv::Writer::from_writer(Vec::new());
    if history.is_empty() {
        w.write_record(EQUITY_HEADERS)
            .map_err(|e| PersistenceError::Csv(e.to_string()))?;
    }
    for r in history.records() {
        w.serialize(EquityRow::from(r))
            .map_err(|e| PersistenceError::Csv(e.to_string()))?;
    }
    w.into_inner().map_err(|e| PersistenceError::Csv(e.to_string()))
}
