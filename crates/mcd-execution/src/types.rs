use std::fmt;

use chrono::NaiveDate;
use mcd_md::{DataUnavailable, SourceFailure};
use mcd_portfolio::PortfolioError;
use mcd_schemas::{Action, Trade, TradeLogEntry};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::proposal::MalformedTrade;

/// Why a single trade was not executed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradeError {
    #[error(transparent)]
    Malformed(#[from] MalformedTrade),
    #[error("price unavailable: {0}")]
    PriceUnavailable(#[from] DataUnavailable),
    #[error(transparent)]
    Portfolio(#[from] PortfolioError),
}

impl TradeError {
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, TradeError::Portfolio(PortfolioError::InsufficientFunds { .. }))
    }

    pub fn is_insufficient_shares(&self) -> bool {
        matches!(self, TradeError::Portfolio(PortfolioError::InsufficientShares { .. }))
    }
}

/// A trade that was not executed, with its position in the input batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedTrade {
    pub index: usize,
    /// `None` when the proposal never validated.
    pub trade: Option<Trade>,
    pub error: TradeError,
}

impl fmt::Display for RejectedTrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.trade {
            Some(t) => write!(f, "#{} {t}: {}", self.index, self.error),
            None => write!(f, "#{}: {}", self.index, self.error),
        }
    }
}

/// Non-fatal observations made while processing a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Primary source failed; the price came from a fallback.
    FallbackUsed {
        ticker: String,
        date: NaiveDate,
        source: String,
    },
    /// Every source failed for (ticker, date).
    SourceOutage {
        ticker: String,
        date: NaiveDate,
        failures: Vec<SourceFailure>,
    },
    /// A stop-loss forced a full liquidation.
    StopLossTriggered {
        ticker: String,
        stop_loss: Decimal,
        price: Decimal,
        shares: Decimal,
        /// Action of the queued trade that was overridden; `None` for a sweep.
        overridden: Option<Action>,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::FallbackUsed { ticker, date, source } => {
                write!(f, "{ticker} {date}: primary source failed, priced from {source}")
            }
            Notice::SourceOutage { ticker, date, failures } => {
                write!(f, "{ticker} {date}: all sources failed")?;
                for fl in failures {
                    write!(f, "; {fl}")?;
                }
                Ok(())
            }
            Notice::StopLossTriggered {
                ticker,
                stop_loss,
                price,
                shares,
                overridden,
            } => {
                write!(f, "{ticker}: stop-loss {stop_loss} hit at {price}, sold {shares}")?;
                if let Some(a) = overridden {
                    write!(f, " (queued {a} overridden)")?;
                }
                Ok(())
            }
        }
    }
}

/// Aggregate result of one processing batch.
///
/// Every input lands in exactly one of `executed` / `rejected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub run_id: Uuid,
    pub as_of: NaiveDate,
    pub executed: Vec<TradeLogEntry>,
    pub rejected: Vec<RejectedTrade>,
    pub notices: Vec<Notice>,
}

impl BatchOutcome {
    pub fn new(run_id: Uuid, as_of: NaiveDate) -> Self {
        Self {
            run_id,
            as_of,
            executed: Vec::new(),
            rejected: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn processed(&self) -> usize {
        self.executed.len() + self.rejected.len()
    }

    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    pub fn stop_losses_triggered(&self) -> usize {
        self.executed.iter().filter(|e| e.stop_loss_triggered).count()
    }

    pub(crate) fn note(&mut self, n: Notice) {
        if !self.notices.contains(&n) {
            self.notices.push(n);
        }
    }
}
