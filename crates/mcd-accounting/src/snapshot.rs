use std::sync::Arc;

use chrono::NaiveDate;
use mcd_md::{MarketDataProvider, QuoteOrigin};
use mcd_portfolio::{MarkMap, Portfolio, PortfolioError, ValuationMetrics};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::history::{EquityHistory, EquityRecord};
use crate::{AccountingError, NORMALIZED_DP};

/// Default value the benchmark is indexed to on its baseline date.
pub const DEFAULT_BASELINE_EQUITY: Decimal = Decimal::from_parts(100, 0, 0, false, 0);

/// Per-holding valuation line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HoldingValuation {
    pub ticker: String,
    pub shares: Decimal,
    pub avg_cost: Decimal,
    pub stop_loss: Option<Decimal>,
    pub current_price: Decimal,
    pub market_value: Decimal,
    pub cost_basis: Decimal,
    pub pnl: Decimal,
    pub price_source: String,
    pub price_origin: QuoteOrigin,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BenchmarkValue {
    pub ticker: String,
    pub price: Decimal,
    pub baseline_date: NaiveDate,
    pub baseline_price: Decimal,
    /// baseline_equity × price / baseline_price
    pub indexed_value: Decimal,
}

/// Valuation of the portfolio on one date. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValuationSnapshot {
    pub date: NaiveDate,
    pub cash: Decimal,
    pub holdings_value: Decimal,
    pub total_equity: Decimal,
    pub daily_pnl: Decimal,
    pub cumulative_pnl: Decimal,
    /// Equity the daily P&L was measured against.
    pub previous_equity: Decimal,
    pub benchmark: Option<BenchmarkValue>,
    pub holdings: Vec<HoldingValuation>,
}

impl ValuationSnapshot {
    /// Daily P&L as a percentage of the previous equity; zero when that is zero.
    pub fn daily_pnl_pct(&self) -> Decimal {
        pct_of(self.daily_pnl, self.previous_equity)
    }

    pub fn cumulative_pnl_pct(&self, initial_equity: Decimal) -> Decimal {
        pct_of(self.cumulative_pnl, initial_equity)
    }

    /// Holdings currently above cost.
    pub fn winners(&self) -> usize {
        self.holdings.iter().filter(|h| h.pnl > Decimal::ZERO).count()
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.holdings.iter().map(|h| h.pnl).sum()
    }
}

pub(crate) fn pct_of(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    (part / whole * Decimal::ONE_HUNDRED).round_dp(4)
}

/// Produces valuation snapshots and keeps the equity history they are
/// measured against.
pub struct DailyAccountant {
    md: Arc<MarketDataProvider>,
    history: EquityHistory,
    baseline_equity: Decimal,
    baseline_date: Option<NaiveDate>,
}

impl DailyAccountant {
    pub fn new(md: Arc<MarketDataProvider>, history: EquityHistory) -> Self {
        Self {
            md,
            history,
            baseline_equity: DEFAULT_BASELINE_EQUITY,
            baseline_date: None,
        }
    }

    pub fn with_baseline_equity(mut self, v: Decimal) -> Self {
        self.baseline_equity = v;
        self
    }

    /// Pin the benchmark baseline date instead of deriving it from history.
    pub fn with_baseline_date(mut self, d: Option<NaiveDate>) -> Self {
        self.baseline_date = d;
        self
    }

    pub fn history(&self) -> &EquityHistory {
        &self.history
    }

    pub fn into_history(self) -> EquityHistory {
        self.history
    }

    /// Baseline date: configured, else first recorded date, else `date`.
    pub fn benchmark_baseline_date(&self, date: NaiveDate) -> NaiveDate {
        self.baseline_date.or(self.history.first_date()).unwrap_or(date)
    }

    /// Value `portfolio` at `date`.
    ///
    /// Fails if any holding cannot be priced; no partial snapshot is produced.
    /// A benchmark that cannot be priced is left out with a warning.
    pub async fn compute_snapshot(
        &self,
        portfolio: &Portfolio,
        date: NaiveDate,
        benchmark_ticker: Option<&str>,
    ) -> Result<ValuationSnapshot, AccountingError> {
        let mut quotes = Vec::with_capacity(portfolio.holdings().len());
        for h in portfolio.holdings().values() {
            quotes.push(self.md.get_price(&h.ticker, date).await?);
        }
        let marks: MarkMap = quotes.iter().map(|q| (q.ticker.clone(), q.price)).collect();
        let totals = portfolio.totals(&marks)?;

        let overflow = || PortfolioError::Overflow("holding valuation");
        let mut lines = Vec::with_capacity(quotes.len());
        for (h, q) in portfolio.holdings().values().zip(quotes) {
            lines.push(HoldingValuation {
                ticker: h.ticker.clone(),
                shares: h.shares,
                avg_cost: h.avg_cost,
                stop_loss: h.stop_loss,
                current_price: q.price,
                market_value: h.market_value(q.price).ok_or_else(overflow)?,
                cost_basis: h.cost_basis().ok_or_else(overflow)?,
                pnl: h.unrealized_pnl(q.price).ok_or_else(overflow)?,
                price_source: q.source,
                price_origin: q.origin,
            });
        }

        let total_equity = totals.total_equity;
        let previous_equity = self
            .history
            .previous_before(date)
            .map_or(portfolio.initial_equity(), |r| r.total_equity);

        let benchmark = match benchmark_ticker {
            Some(t) => self.benchmark_value(t, date).await,
            None => None,
        };

        let snap = ValuationSnapshot {
            date,
            cash: portfolio.cash(),
            holdings_value: totals.holdings_value,
            total_equity,
            daily_pnl: total_equity - previous_equity,
            cumulative_pnl: total_equity - portfolio.initial_equity(),
            previous_equity,
            benchmark,
            holdings: lines,
        };
        tracing::info!(
            %date,
            total_equity = %snap.total_equity,
            daily_pnl = %snap.daily_pnl,
            holdings = snap.holdings.len(),
            "valuation snapshot computed"
        );
        Ok(snap)
    }

    async fn benchmark_value(&self, ticker: &str, date: NaiveDate) -> Option<BenchmarkValue> {
        let baseline_date = self.benchmark_baseline_date(date);
        let priced = async {
            let now = self.md.get_price(ticker, date).await?;
            let base = self.md.get_price(ticker, baseline_date).await?;
            Ok::<_, mcd_md::DataUnavailable>((now, base))
        };
        match priced.await {
            Ok((now, base)) => Some(BenchmarkValue {
                ticker: now.ticker,
                price: now.price,
                baseline_date,
                baseline_price: base.price,
                indexed_value: (self.baseline_equity * now.price / base.price).round_dp(NORMALIZED_DP),
            }),
            Err(e) => {
                tracing::warn!(benchmark = ticker, %date, error = %e, "benchmark unavailable; snapshot without benchmark");
                None
            }
        }
    }

    /// Append `snapshot` to the history. A date can only be recorded once.
    pub fn record(&mut self, snapshot: &ValuationSnapshot) -> Result<EquityRecord, AccountingError> {
        let rec = EquityRecord::from(snapshot);
        self.history.record(rec.clone())?;
        tracing::info!(date = %rec.date, total_equity = %rec.total_equity, "equity recorded");
        Ok(rec)
    }
}
