use std::collections::BTreeMap;

use mcd_schemas::{is_valid_ticker, normalize_ticker};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::DEFAULT_STARTING_CASH;

/// Every way a portfolio operation can be refused.
///
/// A refused operation never leaves partial state behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortfolioError {
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },
    #[error("insufficient shares of {ticker}: requested {requested}, held {held}")]
    InsufficientShares {
        ticker: String,
        requested: Decimal,
        held: Decimal,
    },
    #[error("invalid per-share cost {0} (must be >= 0)")]
    InvalidCost(Decimal),
    #[error("invalid holding {ticker}: {reason}")]
    InvalidHolding { ticker: String, reason: String },
    #[error("duplicate holding {0}")]
    DuplicateHolding(String),
    #[error("no holding for {0}")]
    UnknownHolding(String),
    #[error("cash must be >= 0 (got {0})")]
    NegativeCash(Decimal),
    #[error("no mark for {0}")]
    MissingMark(String),
    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),
}

/// One long position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    /// Always > 0 while the holding exists.
    pub shares: Decimal,
    pub avg_cost: Decimal,
    pub stop_loss: Option<Decimal>,
}

impl Holding {
    pub fn new(ticker: &str, shares: Decimal, avg_cost: Decimal) -> Self {
        Self {
            ticker: normalize_ticker(ticker),
            shares,
            avg_cost,
            stop_loss: None,
        }
    }

    pub fn with_stop_loss(mut self, stop: Decimal) -> Self {
        self.stop_loss = Some(stop);
        self
    }

    /// `None` when the product leaves the `Decimal` range.
    pub fn cost_basis(&self) -> Option<Decimal> {
        self.avg_cost.checked_mul(self.shares)
    }

    pub fn market_value(&self, price: Decimal) -> Option<Decimal> {
        self.shares.checked_mul(price)
    }

    pub fn unrealized_pnl(&self, price: Decimal) -> Option<Decimal> {
        price.checked_sub(self.avg_cost)?.checked_mul(self.shares)
    }

    /// True when `price` is at or through the stop.
    pub fn stop_breached(&self, price: Decimal) -> bool {
        self.stop_loss.is_some_and(|stop| price <= stop)
    }

    fn check(&self) -> Result<(), PortfolioError> {
        let invalid = |reason: &str| PortfolioError::InvalidHolding {
            ticker: self.ticker.clone(),
            reason: reason.to_string(),
        };
        if !is_valid_ticker(&self.ticker) {
            return Err(invalid("bad ticker symbol"));
        }
        if self.shares <= Decimal::ZERO {
            return Err(invalid("shares must be > 0"));
        }
        if self.avg_cost < Decimal::ZERO {
            return Err(invalid("avg_cost must be >= 0"));
        }
        if self.stop_loss.is_some_and(|s| s <= Decimal::ZERO) {
            return Err(invalid("stop_loss must be > 0 when set"));
        }
        Ok(())
    }
}

/// Cash + holdings, keyed by normalized ticker.
///
/// Fields are private: cash and shares change only through
/// [`Portfolio::apply_delta`], which checks every invariant before mutating.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Portfolio {
    pub(crate) cash: Decimal,
    pub(crate) initial_equity: Decimal,
    pub(crate) holdings: BTreeMap<String, Holding>,
}

impl Portfolio {
    /// Empty portfolio; `initial_cash` is also the P&L reference equity.
    pub fn new(initial_cash: Decimal) -> Result<Self, PortfolioError> {
        if initial_cash < Decimal::ZERO {
            return Err(PortfolioError::NegativeCash(initial_cash));
        }
        Ok(Self {
            cash: initial_cash,
            initial_equity: initial_cash,
            holdings: BTreeMap::new(),
        })
    }

    pub fn with_default_cash() -> Self {
        Self {
            cash: DEFAULT_STARTING_CASH,
            initial_equity: DEFAULT_STARTING_CASH,
            holdings: BTreeMap::new(),
        }
    }

    /// Rebuild from persisted state, re-checking every invariant.
    pub fn from_parts<I>(cash: Decimal, initial_equity: Decimal, holdings: I) -> Result<Self, PortfolioError>
    where
        I: IntoIterator<Item = Holding>,
    {
        if cash < Decimal::ZERO {
            return Err(PortfolioError::NegativeCash(cash));
        }
        let mut map = BTreeMap::new();
        for mut h in holdings {
            h.ticker = normalize_ticker(&h.ticker);
            h.check()?;
            if map.contains_key(&h.ticker) {
                return Err(PortfolioError::DuplicateHolding(h.ticker));
            }
            map.insert(h.ticker.clone(), h);
        }
        Ok(Self {
            cash,
            initial_equity,
            holdings: map,
        })
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn initial_equity(&self) -> Decimal {
        self.initial_equity
    }

    pub fn holdings(&self) -> &BTreeMap<String, Holding> {
        &self.holdings
    }

    pub fn holding(&self, ticker: &str) -> Option<&Holding> {
        self.holdings.get(&normalize_ticker(ticker))
    }

    pub fn shares_of(&self, ticker: &str) -> Decimal {
        self.holding(ticker).map_or(Decimal::ZERO, |h| h.shares)
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.holdings.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    /// Set or clear the stop-loss of an existing holding.
    pub fn set_stop_loss(&mut self, ticker: &str, stop: Option<Decimal>) -> Result<(), PortfolioError> {
        let key = normalize_ticker(ticker);
        if let Some(s) = stop {
            if s <= Decimal::ZERO {
                return Err(PortfolioError::InvalidHolding {
                    ticker: key,
                    reason: "stop_loss must be > 0 when set".to_string(),
                });
            }
        }
        let h = self
            .holdings
            .get_mut(&key)
            .ok_or(PortfolioError::UnknownHolding(key))?;
        h.stop_loss = stop;
        Ok(())
    }
}
