//! Untrusted trade-proposal intake.
//!
//! Proposals arrive from manual entry or from an external suggestion parser
//! and are loosely typed (numbers may be strings, `0` means "unset" for price
//! and stop-loss). Every proposal goes through [`TradeProposal::validate`]
//! before it can become a [`Trade`].

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use mcd_schemas::{normalize_ticker, Action, Trade, TradeFieldError, TradeOrigin};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A proposal that failed validation. `index` is its position in the input
/// list, or `None` when the input as a whole is unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct MalformedTrade {
    pub index: Option<usize>,
    pub reason: String,
}

impl MalformedTrade {
    fn at(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            reason: reason.into(),
        }
    }

    fn input(reason: impl Into<String>) -> Self {
        Self {
            index: None,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for MalformedTrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "malformed trade #{i}: {}", self.reason),
            None => write!(f, "malformed trade input: {}", self.reason),
        }
    }
}

/// The loose shape of a proposed trade. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeProposal {
    #[serde(default)]
    pub action: Option<Value>,
    #[serde(default)]
    pub ticker: Option<Value>,
    #[serde(default)]
    pub shares: Option<Value>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default, alias = "stopLoss")]
    pub stop_loss: Option<Value>,
    #[serde(default)]
    pub origin: Option<Value>,
    #[serde(default, alias = "date")]
    pub asof_date: Option<Value>,
    /// Free-text rationale; carried for display only.
    #[serde(default)]
    pub reason: Option<String>,
}

impl TradeProposal {
    /// Manual-entry form: `price`/`stop_loss` of `0` mean unset, as the
    /// form's number inputs default to 0.
    pub fn manual(
        action: Action,
        ticker: &str,
        shares: Decimal,
        price: Option<Decimal>,
        stop_loss: Option<Decimal>,
    ) -> Self {
        let num = |d: Decimal| Value::String(d.to_string());
        Self {
            action: Some(Value::String(action.as_str().to_string())),
            ticker: Some(Value::String(ticker.to_string())),
            shares: Some(num(shares)),
            price: price.map(num),
            stop_loss: stop_loss.map(num),
            origin: Some(Value::String(TradeOrigin::Manual.as_str().to_string())),
            asof_date: None,
            reason: None,
        }
    }

    /// Best-effort action, for counting pending batches without full validation.
    pub fn action_hint(&self) -> Option<Action> {
        self.action.as_ref().and_then(Value::as_str).and_then(Action::parse)
    }

    /// Validate into an immutable [`Trade`].
    ///
    /// Rules:
    /// - ticker: string, non-empty after trim, `[A-Z0-9.^-]` after upper-casing
    /// - action: `buy` / `sell`, case-insensitive
    /// - shares: present, numeric, > 0
    /// - price / stop_loss: numeric and >= 0 when present; `0` means unset
    /// - origin: `manual` / `suggested`; `default_origin` when absent
    /// - asof_date: `YYYY-MM-DD` when present
    pub fn validate(&self, index: usize, default_origin: TradeOrigin) -> Result<Trade, MalformedTrade> {
        let bad = |reason: String| MalformedTrade::at(index, reason);

        let ticker = match &self.ticker {
            Some(Value::String(s)) if !s.trim().is_empty() => normalize_ticker(s),
            Some(Value::String(_)) | None | Some(Value::Null) => return Err(bad("ticker is required".into())),
            Some(other) => return Err(bad(format!("ticker must be a string (got {other})"))),
        };

        let action = match &self.action {
            Some(Value::String(s)) => {
                Action::parse(s).ok_or_else(|| bad(format!("action must be buy or sell (got '{s}')")))?
            }
            None | Some(Value::Null) => return Err(bad("action is required".into())),
            Some(other) => return Err(bad(format!("action must be a string (got {other})"))),
        };

        let shares = decimal_field(&self.shares, "shares")
            .map_err(bad)?
            .ok_or_else(|| bad("shares is required".into()))?;

        let price = optional_positive(&self.price, "price").map_err(bad)?;
        let stop_loss = optional_positive(&self.stop_loss, "stop_loss").map_err(bad)?;

        let origin = match &self.origin {
            None | Some(Value::Null) => default_origin,
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "manual" => TradeOrigin::Manual,
                "suggested" | "llm" | "ai" => TradeOrigin::Suggested,
                other => return Err(bad(format!("unknown origin '{other}'"))),
            },
            Some(other) => return Err(bad(format!("origin must be a string (got {other})"))),
        };

        let asof = match &self.asof_date {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(
                NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .map_err(|_| bad(format!("asof_date must be YYYY-MM-DD (got '{s}')")))?,
            ),
            Some(other) => return Err(bad(format!("asof_date must be a string (got {other})"))),
        };

        let trade = Trade::new(&ticker, action, shares, price, stop_loss, origin).map_err(|e| match e {
            TradeFieldError::Ticker(t) => bad(format!("invalid ticker '{t}'")),
            other => bad(other.to_string()),
        })?;

        Ok(match asof {
            Some(d) => trade.with_asof(d),
            None => trade,
        })
    }
}

/// Parse a numeric JSON value that may arrive as a number or a string
/// (`"12.50"`, `"$1,200"`). `Ok(None)` when absent or null.
fn decimal_field(v: &Option<Value>, field: &str) -> Result<Option<Decimal>, String> {
    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .map(Some)
            .map_err(|_| format!("{field} is not a usable number ({n})")),
        Some(Value::String(s)) => {
            let cleaned: String = s.trim().trim_start_matches('$').chars().filter(|c| *c != ',').collect();
            if cleaned.is_empty() {
                return Ok(None);
            }
            Decimal::from_str(&cleaned)
                .map(Some)
                .map_err(|_| format!("{field} must be numeric (got '{s}')"))
        }
        Some(other) => Err(format!("{field} must be numeric (got {other})")),
    }
}

/// `0` means unset; negative is malformed.
fn optional_positive(v: &Option<Value>, field: &str) -> Result<Option<Decimal>, String> {
    match decimal_field(v, field)? {
        None => Ok(None),
        Some(d) if d.is_zero() => Ok(None),
        Some(d) if d < Decimal::ZERO => Err(format!("{field} must be >= 0 (got {d})")),
        Some(d) => Ok(Some(d)),
    }
}

/// Parse a proposal document: a JSON array of objects, or an object with a
/// `trades` array. Individual entries are validated later; only a document
/// that is not readable as a list of objects fails here.
pub fn parse_proposals_json(text: &str) -> Result<Vec<TradeProposal>, MalformedTrade> {
    let doc: Value =
        serde_json::from_str(text.trim()).map_err(|e| MalformedTrade::input(format!("invalid json: {e}")))?;

    let items = match doc {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("trades") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(MalformedTrade::input("'trades' must be an array")),
            None => return Err(MalformedTrade::input("expected an array or an object with a 'trades' array")),
        },
        _ => return Err(MalformedTrade::input("expected an array or an object with a 'trades' array")),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            if !item.is_object() {
                return Err(MalformedTrade::at(i, "expected an object"));
            }
            serde_json::from_value(item).map_err(|e| MalformedTrade::at(i, e.to_string()))
        })
        .collect()
}

/// Counts for a pending batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub buys: usize,
    pub sells: usize,
    pub total: usize,
}

impl BatchSummary {
    pub fn of(trades: &[Trade]) -> Self {
        let buys = trades.iter().filter(|t| t.action() == Action::Buy).count();
        Self {
            buys,
            sells: trades.len() - buys,
            total: trades.len(),
        }
    }

    /// Proposals whose action is unreadable count toward `total` only.
    pub fn of_proposals(proposals: &[TradeProposal]) -> Self {
        let mut s = Self {
            total: proposals.len(),
            ..Self::default()
        };
        for p in proposals {
            match p.action_hint() {
                Some(Action::Buy) => s.buys += 1,
                Some(Action::Sell) => s.sells += 1,
                None => {}
            }
        }
        s
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pending ({} buy, {} sell)", self.total, self.buys, self.sells)
    }
}
