//! mcd-store
//!
//! Persistence boundary for the data directory:
//!
//! | file                 | content                                   |
//! |----------------------|-------------------------------------------|
//! | `portfolio.csv`      | holdings + recomputed valuation columns   |
//! | `account.json`       | cash, initial equity, last update         |
//! | `trade_log.csv`      | executed trades (see `mcd-tradelog`)      |
//! | `equity_history.csv` | one row per recorded valuation            |
//!
//! Loose file input is normalized into strict `Holding` records here; nothing
//! downstream re-validates. Writes go through a temp file + rename, and a
//! commit either lands log and portfolio together or leaves both untouched.

mod account;
mod atomic;
mod equity_csv;
mod holdings_csv;

pub use account::AccountFile;
pub use equity_csv::{encode_history, read_history, EQUITY_HEADERS};
pub use holdings_csv::{encode_holdings, parse_holdings, read_holdings, validate_portfolio_file, PORTFOLIO_HEADERS};

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use mcd_accounting::{AccountingError, EquityHistory, EquityRecord};
use mcd_portfolio::{MarkMap, Portfolio, PortfolioError};
use mcd_schemas::TradeLogEntry;
use mcd_tradelog::{CsvTradeLog, TradeLog, TradeLogError};
use rust_decimal::Decimal;
use thiserror::Error;

use atomic::{read_existing, restore, write_atomic, Staged};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(String),
    #[error("json error at {path}: {message}")]
    Json { path: PathBuf, message: String },
    #[error("missing required columns: {0}")]
    MissingColumns(String),
    #[error("row {row}: {reason}")]
    Invalid { row: usize, reason: String },
    #[error("{0} is empty")]
    Empty(PathBuf),
    #[error("no portfolio at {0} (run init first)")]
    NotInitialized(PathBuf),
    #[error("portfolio already exists at {0}")]
    AlreadyExists(PathBuf),
    #[error(transparent)]
    TradeLog(#[from] TradeLogError),
    #[error(transparent)]
    Portfolio(#[from] PortfolioError),
    #[error(transparent)]
    Accounting(#[from] AccountingError),
}

impl PersistenceError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub const PORTFOLIO_FILE: &str = "portfolio.csv";
pub const ACCOUNT_FILE: &str = "account.json";
pub const TRADE_LOG_FILE: &str = "trade_log.csv";
pub const EQUITY_HISTORY_FILE: &str = "equity_history.csv";

/// The data directory and the files in it.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Creates `root` if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| PersistenceError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn portfolio_path(&self) -> PathBuf {
        self.root.join(PORTFOLIO_FILE)
    }

    pub fn account_path(&self) -> PathBuf {
        self.root.join(ACCOUNT_FILE)
    }

    pub fn trade_log_path(&self) -> PathBuf {
        self.root.join(TRADE_LOG_FILE)
    }

    pub fn equity_history_path(&self) -> PathBuf {
        self.root.join(EQUITY_HISTORY_FILE)
    }

    pub fn is_initialized(&self) -> bool {
        self.account_path().exists()
    }

    /// Create an empty portfolio with `cash`. Refuses to overwrite unless
    /// `force`, which also clears the trade log and equity history.
    pub fn init(&self, cash: Decimal, force: bool) -> Result<Portfolio, PersistenceError> {
        if self.is_initialized() && !force {
            return Err(PersistenceError::AlreadyExists(self.root.clone()));
        }
        let pf = Portfolio::new(cash)?;
        if force {
            restore(&self.trade_log_path(), None)?;
            restore(&self.equity_history_path(), None)?;
        }
        write_atomic(&self.portfolio_path(), &encode_holdings(&pf, &MarkMap::new())?)?;
        write_atomic(&self.account_path(), &self.account_for(&pf).encode()?)?;
        tracing::info!(root = %self.root.display(), %cash, "portfolio initialized");
        Ok(pf)
    }

    pub fn load_portfolio(&self) -> Result<Portfolio, PersistenceError> {
        let account_path = self.account_path();
        if !account_path.exists() {
            return Err(PersistenceError::NotInitialized(self.root.clone()));
        }
        let account = AccountFile::read(&account_path)?;
        let holdings = read_holdings(&self.portfolio_path())?;
        let pf = Portfolio::from_parts(account.cash, account.initial_equity, holdings)?;
        tracing::debug!(cash = %pf.cash(), holdings = pf.holdings().len(), "portfolio loaded");
        Ok(pf)
    }

    pub fn trade_log(&self) -> Result<CsvTradeLog, PersistenceError> {
        Ok(CsvTradeLog::new(self.trade_log_path())?)
    }

    pub fn load_equity_history(&self) -> Result<EquityHistory, PersistenceError> {
        read_history(&self.equity_history_path())
    }

    fn account_for(&self, pf: &Portfolio) -> AccountFile {
        AccountFile {
            cash: pf.cash(),
            initial_equity: pf.initial_equity(),
            updated_at: Utc::now(),
        }
    }

    /// Persist a processed batch: append `entries` to the trade log and replace
    /// the portfolio and account files.
    ///
    /// Order: stage both files, append the log, rename portfolio then account.
    /// Any failure after the append truncates the log back and restores the
    /// portfolio file if it was already renamed.
    pub fn commit(
        &self,
        portfolio: &Portfolio,
        entries: &[TradeLogEntry],
        marks: &MarkMap,
    ) -> Result<(), PersistenceError> {
        let pf_path = self.portfolio_path();
        let acct_path = self.account_path();
        let before_pf = read_existing(&pf_path)?;
        let mut log = self.trade_log()?;
        let log_len = log.byte_len()?;

        let staged_pf = Staged::write(&pf_path, &encode_holdings(portfolio, marks)?)?;
        let staged_acct = match self.account_for(portfolio).encode().and_then(|b| Staged::write(&acct_path, &b)) {
            Ok(s) => s,
            Err(e) => {
                staged_pf.discard();
                return Err(e);
            }
        };

        if let Err(e) = log.append_batch(entries) {
            staged_pf.discard();
            staged_acct.discard();
            return Err(e.into());
        }

        let rollback = |stage: &str, e: PersistenceError, pf_renamed: bool| {
            tracing::warn!(stage, error = %e, "commit failed; rolling back");
            if let Err(re) = log.truncate_to(log_len) {
                tracing::error!(error = %re, "trade log rollback failed");
            }
            if pf_renamed {
                if let Err(re) = restore(&pf_path, before_pf.as_deref()) {
                    tracing::error!(error = %re, "portfolio rollback failed");
                }
            }
            e
        };

        if let Err(e) = staged_pf.commit() {
            staged_acct.discard();
            return Err(rollback("portfolio", e, false));
        }
        if let Err(e) = staged_acct.commit() {
            return Err(rollback("account", e, true));
        }

        tracing::info!(
            trades = entries.len(),
            cash = %portfolio.cash(),
            holdings = portfolio.holdings().len(),
            "commit complete"
        );
        Ok(())
    }

    /// Append `record` to the equity history and refresh the valuation
    /// columns of the portfolio file from `marks`.
    ///
    /// Both files are staged first. The history is renamed, then the
    /// portfolio; if the second rename fails the history is put back.
    pub fn record_equity(
        &self,
        record: EquityRecord,
        portfolio: &Portfolio,
        marks: &MarkMap,
    ) -> Result<(), PersistenceError> {
        let hist_path = self.equity_history_path();
        let before_hist = read_existing(&hist_path)?;
        let mut history = self.load_equity_history()?;
        history.record(record)?;

        let staged_hist = Staged::write(&hist_path, &encode_history(&history)?)?;
        let staged_pf = match encode_holdings(portfolio, marks).and_then(|b| Staged::write(&self.portfolio_path(), &b)) {
            Ok(s) => s,
            Err(e) => {
                staged_hist.discard();
                return Err(e);
            }
        };

        if let Err(e) = staged_hist.commit() {
            staged_pf.discard();
            return Err(e);
        }
        if let Err(e) = staged_pf.commit() {
            tracing::warn!(error = %e, "equity record failed; rolling back history");
            if let Err(re) = restore(&hist_path, before_hist.as_deref()) {
                tracing::error!(error = %re, "equity history rollback failed");
            }
            return Err(e);
        }
        Ok(())
    }
}
