use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use mcd_md::{DataUnavailable, MarketDataProvider, PriceQuote, QuoteOrigin};
use mcd_portfolio::{Portfolio, PortfolioError};
use mcd_schemas::{Action, Trade, TradeLogEntry, TradeOrigin};
use mcd_tradelog::{TradeLog, TradeLogError};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::proposal::TradeProposal;
use crate::types::{BatchOutcome, Notice, RejectedTrade, TradeError};

/// Price source label for explicit-price orders.
pub const LIMIT_PRICE_SOURCE: &str = "limit";

/// Executes validated trades against a portfolio, one at a time, in input
/// order. Rejections never abort the batch.
#[derive(Clone)]
pub struct TradeExecutor {
    md: Arc<MarketDataProvider>,
}

/// Reference price for one trade and where it came from.
struct Reference {
    price: Decimal,
    source: String,
}

/// Per-batch state that every executed entry draws from.
struct Run {
    outcome: BatchOutcome,
    last_ts: Option<DateTime<Utc>>,
}

impl Run {
    fn new(as_of: NaiveDate) -> Self {
        Self {
            outcome: BatchOutcome::new(Uuid::new_v4(), as_of),
            last_ts: None,
        }
    }

    // Log timestamps never go backwards within a run.
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_ts {
            Some(last) if now < last => last,
            _ => now,
        };
        self.last_ts = Some(ts);
        ts
    }

    fn reject(&mut self, index: usize, trade: Option<Trade>, error: TradeError) {
        tracing::warn!(index, error = %error, "trade rejected");
        self.outcome.rejected.push(RejectedTrade { index, trade, error });
    }
}

impl TradeExecutor {
    pub fn new(md: Arc<MarketDataProvider>) -> Self {
        Self { md }
    }

    pub fn market_data(&self) -> &MarketDataProvider {
        &self.md
    }

    /// Execute `trades` in order against `portfolio` for `date`.
    ///
    /// The portfolio is mutated in place; the caller observes the post-batch
    /// state. `executed.len() + rejected.len() == trades.len()`.
    pub async fn process_trades(&self, portfolio: &mut Portfolio, trades: &[Trade], date: NaiveDate) -> BatchOutcome {
        let mut run = Run::new(date);
        for (index, trade) in trades.iter().enumerate() {
            self.execute_one(portfolio, index, trade, date, &mut run).await;
        }
        self.finish(run)
    }

    /// Validate and execute loosely-typed proposals. Malformed proposals are
    /// rejected in place; the rest execute in their original positions.
    pub async fn process_proposals(
        &self,
        portfolio: &mut Portfolio,
        proposals: &[TradeProposal],
        date: NaiveDate,
        default_origin: TradeOrigin,
    ) -> BatchOutcome {
        let mut run = Run::new(date);
        for (index, proposal) in proposals.iter().enumerate() {
            match proposal.validate(index, default_origin) {
                Ok(trade) => self.execute_one(portfolio, index, &trade, date, &mut run).await,
                Err(malformed) => run.reject(index, None, malformed.into()),
            }
        }
        self.finish(run)
    }

    /// Like [`process_trades`](Self::process_trades), but also appends the
    /// executed entries to `log` as one batch. The portfolio only changes if
    /// the append succeeds.
    pub async fn process_into(
        &self,
        portfolio: &mut Portfolio,
        trades: &[Trade],
        date: NaiveDate,
        log: &mut dyn TradeLog,
    ) -> Result<BatchOutcome, TradeLogError> {
        let mut working = portfolio.clone();
        let outcome = self.process_trades(&mut working, trades, date).await;
        log.append_batch(&outcome.executed)?;
        *portfolio = working;
        Ok(outcome)
    }

    /// Liquidate every holding whose stop-loss is breached by the quote for
    /// `date`. Holdings without a quote are reported, not liquidated.
    ///
    /// The sweep is its own run: rejection indices count guarded holdings in
    /// ticker order, not trades of any earlier batch.
    pub async fn sweep_stop_losses(&self, portfolio: &mut Portfolio, date: NaiveDate) -> BatchOutcome {
        let mut run = Run::new(date);
        let guarded: Vec<(String, Decimal)> = portfolio
            .holdings()
            .values()
            .filter_map(|h| h.stop_loss.map(|s| (h.ticker.clone(), s)))
            .collect();

        for (index, (ticker, stop)) in guarded.into_iter().enumerate() {
            let quote = match self.quote(&ticker, date, &mut run).await {
                Ok(q) => q,
                Err(_) => continue,
            };
            if quote.price > stop {
                continue;
            }
            let reference = Reference {
                price: quote.price,
                source: quote.source,
            };
            let held = portfolio.shares_of(&ticker);
            if let Err(e) = self.liquidate(portfolio, &ticker, &reference, None, TradeOrigin::Manual, date, &mut run) {
                run.reject(index, Trade::market(&ticker, Action::Sell, held).ok(), e);
            }
        }
        self.finish(run)
    }

    fn finish(&self, run: Run) -> BatchOutcome {
        let o = run.outcome;
        tracing::info!(
            run_id = %o.run_id,
            as_of = %o.as_of,
            executed = o.executed.len(),
            rejected = o.rejected.len(),
            notices = o.notices.len(),
            "trade batch processed"
        );
        o
    }

    async fn quote(&self, ticker: &str, date: NaiveDate, run: &mut Run) -> Result<PriceQuote, DataUnavailable> {
        match self.md.get_price(ticker, date).await {
            Ok(q) => {
                if q.origin == QuoteOrigin::Fallback {
                    run.outcome.note(Notice::FallbackUsed {
                        ticker: q.ticker.clone(),
                        date: q.date,
                        source: q.source.clone(),
                    });
                }
                Ok(q)
            }
            Err(e) => {
                run.outcome.note(Notice::SourceOutage {
                    ticker: e.ticker.clone(),
                    date: e.date,
                    failures: e.failures.clone(),
                });
                Err(e)
            }
        }
    }

    async fn execute_one(&self, portfolio: &mut Portfolio, index: usize, trade: &Trade, date: NaiveDate, run: &mut Run) {
        let as_of = trade.asof_date().unwrap_or(date);

        let reference = match trade.price() {
            Some(px) => Reference {
                price: px,
                source: LIMIT_PRICE_SOURCE.to_string(),
            },
            None => match self.quote(trade.ticker(), as_of, run).await {
                Ok(q) => Reference {
                    price: q.price,
                    source: q.source,
                },
                Err(e) => {
                    run.reject(index, Some(trade.clone()), e.into());
                    return;
                }
            },
        };

        // The existing stop is checked before anything the trade carries.
        let breached = portfolio
            .holding(trade.ticker())
            .is_some_and(|h| h.stop_breached(reference.price));
        if breached {
            if let Err(e) = self.liquidate(
                portfolio,
                trade.ticker(),
                &reference,
                Some(trade.action()),
                trade.origin(),
                as_of,
                run,
            ) {
                run.reject(index, Some(trade.clone()), e);
            }
            return;
        }

        let Some(notional) = trade.shares().checked_mul(reference.price) else {
            run.reject(index, Some(trade.clone()), PortfolioError::Overflow("notional").into());
            return;
        };
        let (shares_delta, cash_delta) = match trade.action() {
            Action::Buy => (trade.shares(), -notional),
            Action::Sell => (-trade.shares(), notional),
        };

        let shares_after = match portfolio.apply_delta(trade.ticker(), shares_delta, cash_delta, None) {
            Ok(s) => s,
            Err(e) => {
                run.reject(index, Some(trade.clone()), e.into());
                return;
            }
        };

        if trade.action() == Action::Buy {
            if let Some(stop) = trade.stop_loss() {
                if let Err(e) = portfolio.set_stop_loss(trade.ticker(), Some(stop)) {
                    tracing::warn!(ticker = trade.ticker(), error = %e, "could not set stop-loss");
                }
            }
        }

        let entry = TradeLogEntry {
            timestamp: run.stamp(),
            ticker: trade.ticker().to_string(),
            action: trade.action(),
            shares: trade.shares(),
            price: reference.price,
            cash_after: portfolio.cash(),
            as_of,
            requested_action: trade.action(),
            price_source: reference.source,
            cash_delta,
            shares_after,
            stop_loss: portfolio.holding(trade.ticker()).and_then(|h| h.stop_loss),
            stop_loss_triggered: false,
            origin: trade.origin(),
            run_id: run.outcome.run_id,
        };
        tracing::info!(
            ticker = %entry.ticker,
            action = %entry.action,
            shares = %entry.shares,
            price = %entry.price,
            cash_after = %entry.cash_after,
            "trade executed"
        );
        run.outcome.executed.push(entry);
    }

    /// Sell the whole position at the reference price because its stop was hit.
    #[allow(clippy::too_many_arguments)]
    fn liquidate(
        &self,
        portfolio: &mut Portfolio,
        ticker: &str,
        reference: &Reference,
        overridden: Option<Action>,
        origin: TradeOrigin,
        as_of: NaiveDate,
        run: &mut Run,
    ) -> Result<(), TradeError> {
        let Some(holding) = portfolio.holding(ticker) else {
            return Ok(());
        };
        let shares = holding.shares;
        let stop = holding.stop_loss.unwrap_or_default();
        let proceeds = shares
            .checked_mul(reference.price)
            .ok_or(PortfolioError::Overflow("liquidation proceeds"))?;

        portfolio.apply_delta(ticker, -shares, proceeds, None)?;

        tracing::warn!(
            ticker,
            stop_loss = %stop,
            price = %reference.price,
            shares = %shares,
            "stop-loss triggered; position liquidated"
        );
        run.outcome.note(Notice::StopLossTriggered {
            ticker: ticker.to_string(),
            stop_loss: stop,
            price: reference.price,
            shares,
            overridden,
        });
        let ts = run.stamp();
        run.outcome.executed.push(TradeLogEntry {
            timestamp: ts,
            ticker: mcd_schemas::normalize_ticker(ticker),
            action: Action::Sell,
            shares,
            price: reference.price,
            cash_after: portfolio.cash(),
            as_of,
            requested_action: overridden.unwrap_or(Action::Sell),
            price_source: reference.source.clone(),
            cash_delta: proceeds,
            shares_after: Decimal::ZERO,
            stop_loss: Some(stop),
            stop_loss_triggered: true,
            origin,
            run_id: run.outcome.run_id,
        });
        Ok(())
    }
}
