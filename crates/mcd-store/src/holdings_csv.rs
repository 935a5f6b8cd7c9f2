//! `portfolio.csv`
//!
//! Columns: `ticker,shares,avg_cost,stop_loss,current_price,market_value,pnl`.
//! Only the first four are read back; the valuation columns are recomputed on
//! every write. Column order is free and unknown columns are ignored.

use std::path::Path;
use std::str::FromStr;

use mcd_portfolio::{Holding, MarkMap, Portfolio};
use mcd_schemas::{is_valid_ticker, normalize_ticker};
use rust_decimal::Decimal;

use crate::PersistenceError;

pub const PORTFOLIO_HEADERS: [&str; 7] = [
    "ticker",
    "shares",
    "avg_cost",
    "stop_loss",
    "current_price",
    "market_value",
    "pnl",
];

const REQUIRED: [&str; 2] = ["ticker", "shares"];

fn invalid(row: usize, reason: impl Into<String>) -> PersistenceError {
    PersistenceError::Invalid {
        row,
        reason: reason.into(),
    }
}

fn parse_dec(row: usize, field: &str, raw: &str) -> Result<Decimal, PersistenceError> {
    Decimal::from_str(raw).map_err(|_| invalid(row, format!("{field}: cannot parse '{raw}'")))
}

/// Parse holdings from CSV text. Zero data rows is allowed here.
pub fn parse_holdings(text: &str) -> Result<Vec<Holding>, PersistenceError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = rdr.headers().map_err(|e| PersistenceError::Csv(e.to_string()))?.clone();
    let col = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));

    let missing: Vec<&str> = REQUIRED.iter().copied().filter(|c| col(*c).is_none()).collect();
    if !missing.is_empty() {
        return Err(PersistenceError::MissingColumns(missing.join(", ")));
    }
    let (ticker_ix, shares_ix) = (col("ticker").unwrap_or(0), col("shares").unwrap_or(1));
    let cost_ix = col("avg_cost");
    let stop_ix = col("stop_loss");

    let mut out: Vec<Holding> = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let row = i + 1;
        let rec = rec.map_err(|e| PersistenceError::Csv(e.to_string()))?;
        let field = |ix: Option<usize>| ix.and_then(|ix| rec.get(ix)).unwrap_or("");

        let ticker = normalize_ticker(field(Some(ticker_ix)));
        if ticker.is_empty() {
            return Err(invalid(row, "ticker is empty"));
        }
        if !is_valid_ticker(&ticker) {
            return Err(invalid(row, format!("ticker '{ticker}' is not a valid symbol")));
        }

        let raw_shares = field(Some(shares_ix));
        if raw_shares.is_empty() {
            return Err(invalid(row, "shares is empty"));
        }
        let shares = parse_dec(row, "shares", raw_shares)?;
        if shares <= Decimal::ZERO {
            return Err(invalid(row, format!("shares must be > 0 (got {shares})")));
        }

        let avg_cost = match field(cost_ix) {
            "" => Decimal::ZERO,
            raw => parse_dec(row, "avg_cost", raw)?,
        };
        if avg_cost < Decimal::ZERO {
            return Err(invalid(row, format!("avg_cost must be >= 0 (got {avg_cost})")));
        }

        let stop_loss = match field(stop_ix) {
            "" => None,
            raw => {
                let s = parse_dec(row, "stop_loss", raw)?;
                if s < Decimal::ZERO {
                    return Err(invalid(row, format!("stop_loss must be >= 0 (got {s})")));
                }
                Some(s).filter(|s| !s.is_zero())
            }
        };

        if out.iter().any(|h| h.ticker == ticker) {
            return Err(invalid(row, format!("duplicate ticker {ticker}")));
        }

        let mut h = Holding::new(&ticker, shares, avg_cost);
        h.stop_loss = stop_loss;
        out.push(h);
    }
    Ok(out)
}

/// Read the holdings file at `path`. A zero-byte file is `Empty`.
pub fn read_holdings(path: &Path) -> Result<Vec<Holding>, PersistenceError> {
    let text = std::fs::read_to_string(path).map_err(|e| PersistenceError::io(path, e))?;
    if text.trim().is_empty() {
        return Err(PersistenceError::Empty(path.to_path_buf()));
    }
    parse_holdings(&text)
}

/// Check an externally supplied portfolio file. Unlike [`read_holdings`], a
/// header with no rows is also rejected.
pub fn validate_portfolio_file(path: &Path) -> Result<Vec<Holding>, PersistenceError> {
    let holdings = read_holdings(path)?;
    if holdings.is_empty() {
        return Err(PersistenceError::Empty(path.to_path_buf()));
    }
    Ok(holdings)
}

/// Encode holdings with valuation columns from `marks`; holdings without a
/// mark get empty valuation cells.
pub fn encode_holdings(portfolio: &Portfolio, marks: &MarkMap) -> Result<Vec<u8>, PersistenceError> {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(PORTFOLIO_HEADERS)
        .map_err(|e| PersistenceError::Csv(e.to_string()))?;

    for h in portfolio.holdings().values() {
        let text = |d: Decimal| d.normalize().to_string();
        let stop = h.stop_loss.map(text).unwrap_or_default();
        let (px, mv, pnl) = match marks.get(&h.ticker) {
            // out-of-range products leave their cell empty
            Some(px) => (
                text(*px),
                h.market_value(*px).map(text).unwrap_or_default(),
                h.unrealized_pnl(*px).map(text).unwrap_or_default(),
            ),
            None => Default::default(),
        };
        let (shares, cost) = (text(h.shares), text(h.avg_cost));
        w.write_record([&h.ticker, &shares, &cost, &stop, &px, &mv, &pnl])
            .map_err(|e| PersistenceError::Csv(e.to_string()))?;
    }
    w.into_inner().map_err(|e| PersistenceError::Csv(e.to_string()))
}
