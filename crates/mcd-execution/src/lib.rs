//! mcd-execution
//!
//! Trade processing engine.
//! - Untrusted proposals are validated into immutable `Trade`s (`proposal`)
//! - `TradeExecutor` prices, stop-checks and applies trades in input order
//! - Batch policy is skip-and-continue: rejections are reported, never fatal
//!
//! No file IO here; committing the log and portfolio is the store's job.

mod executor;
mod proposal;
mod types;

pub use executor::{TradeExecutor, LIMIT_PRICE_SOURCE};
pub use proposal::{parse_proposals_json, BatchSummary, MalformedTrade, TradeProposal};
pub use types::{BatchOutcome, Notice, RejectedTrade, TradeError};
