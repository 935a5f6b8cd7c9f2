//! mcd-portfolio
//!
//! Cash + per-ticker holdings for a single simulated long-only account.
//! - `apply_delta` is the only mutation path for cash and shares
//! - Weighted-average cost basis on buys, unchanged on sells
//! - Valuation math against a mark map
//! - Pure deterministic logic (no IO, no time, no market data)

mod accounting;
mod metrics;
mod types;

pub use metrics::{ValuationMetrics, ValuationTotals};
pub use types::{Holding, Portfolio, PortfolioError};

use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Cash a brand-new portfolio starts with.
pub const DEFAULT_STARTING_CASH: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Decimal places kept on a recomputed average cost.
pub const AVG_COST_DP: u32 = 6;

/// Canonical mark map type (ticker -> price).
pub type MarkMap = BTreeMap<String, Decimal>;

/// Helper to build a MarkMap with minimal boilerplate.
pub fn marks<I, S>(items: I) -> MarkMap
where
    I: IntoIterator<Item = (S, Decimal)>,
    S: AsRef<str>,
{
    let mut m = MarkMap::new();
    for (ticker, px) in items {
        m.insert(mcd_schemas::normalize_ticker(ticker.as_ref()), px);
    }
    m
}
