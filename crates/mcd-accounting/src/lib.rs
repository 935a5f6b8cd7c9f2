//! mcd-accounting
//!
//! Daily valuation and performance.
//! - `DailyAccountant` prices every holding and produces a `ValuationSnapshot`
//! - `EquityHistory` keeps one record per date and feeds daily P&L
//! - `PerformanceSeries` normalizes equity and benchmark to a common baseline
//! - text report helpers for the daily summary
//!
//! Holds no files; the store loads and saves the history.

mod history;
mod performance;
mod report;
mod snapshot;

use chrono::NaiveDate;
use mcd_md::DataUnavailable;
use mcd_portfolio::PortfolioError;
use thiserror::Error;

pub use history::{EquityHistory, EquityRecord};
pub use performance::{PerformancePoint, PerformanceSeries, PerformanceStats};
pub use report::{format_currency, format_percentage, render_daily_report, render_performance_report};
pub use snapshot::{BenchmarkValue, DailyAccountant, HoldingValuation, ValuationSnapshot, DEFAULT_BASELINE_EQUITY};

/// Decimal places kept on normalized / indexed values.
pub const NORMALIZED_DP: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountingError {
    #[error(transparent)]
    DataUnavailable(#[from] DataUnavailable),
    #[error("valuation failed: {0}")]
    Valuation(#[from] PortfolioError),
    #[error("equity already recorded for {0}")]
    DuplicateDate(NaiveDate),
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("no equity records in range")]
    EmptyRange,
}
