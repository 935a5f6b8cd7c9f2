use rust_decimal::Decimal;

use crate::types::{Holding, Portfolio, PortfolioError};
use crate::MarkMap;

/// Mark-to-market totals for the whole portfolio.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValuationTotals {
    pub cash: Decimal,
    pub holdings_value: Decimal,
    pub total_equity: Decimal,
    pub cost_basis: Decimal,
    pub unrealized_pnl: Decimal,
}

/// Valuation against an explicit mark map. Every holding needs a mark; a
/// missing one is an error rather than a silent zero.
pub trait ValuationMetrics {
    fn holdings_value(&self, marks: &MarkMap) -> Result<Decimal, PortfolioError>;
    fn equity(&self, marks: &MarkMap) -> Result<Decimal, PortfolioError>;
    fn unrealized_pnl(&self, marks: &MarkMap) -> Result<Decimal, PortfolioError>;
    fn totals(&self, marks: &MarkMap) -> Result<ValuationTotals, PortfolioError>;
}

fn mark_for(marks: &MarkMap, ticker: &str) -> Result<Decimal, PortfolioError> {
    marks
        .get(ticker)
        .copied()
        .ok_or_else(|| PortfolioError::MissingMark(ticker.to_string()))
}

fn checked_sum<I>(items: I, what: &'static str) -> Result<Decimal, PortfolioError>
where
    I: IntoIterator<Item = Option<Decimal>>,
{
    items
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| v.and_then(|v| acc.checked_add(v)))
        .ok_or(PortfolioError::Overflow(what))
}

impl ValuationMetrics for Portfolio {
    /// Σ shares × mark
    fn holdings_value(&self, marks: &MarkMap) -> Result<Decimal, PortfolioError> {
        // deterministic iteration (BTreeMap)
        let mut values = Vec::with_capacity(self.holdings.len());
        for (ticker, h) in &self.holdings {
            values.push(h.market_value(mark_for(marks, ticker)?));
        }
        checked_sum(values, "holdings value")
    }

    /// cash + Σ shares × mark
    fn equity(&self, marks: &MarkMap) -> Result<Decimal, PortfolioError> {
        self.cash
            .checked_add(self.holdings_value(marks)?)
            .ok_or(PortfolioError::Overflow("equity"))
    }

    /// Σ (mark − avg_cost) × shares
    fn unrealized_pnl(&self, marks: &MarkMap) -> Result<Decimal, PortfolioError> {
        let totals = self.totals(marks)?;
        Ok(totals.unrealized_pnl)
    }

    fn totals(&self, marks: &MarkMap) -> Result<ValuationTotals, PortfolioError> {
        let holdings_value = self.holdings_value(marks)?;
        let cost_basis = checked_sum(
            self.holdings.values().map(Holding::cost_basis),
            "cost basis",
        )?;
        Ok(ValuationTotals {
            cash: self.cash,
            holdings_value,
            total_equity: self.equity(marks)?,
            cost_basis,
            unrealized_pnl: holdings_value
                .checked_sub(cost_basis)
                .ok_or(PortfolioError::Overflow("unrealized pnl"))?,
        })
    }
}
