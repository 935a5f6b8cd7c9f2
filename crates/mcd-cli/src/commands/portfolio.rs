//! Portfolio and trade-batch command handlers.
//!
//! Covers `mcd init`, `mcd validate`, `mcd process`, `mcd log` and `mcd summary`.

use std::path::Path;

use anyhow::{Context, Result};
use mcd_execution::{parse_proposals_json, BatchOutcome, BatchSummary, TradeExecutor, TradeProposal};
use mcd_portfolio::MarkMap;
use mcd_schemas::{DateRange, TradeLogEntry, TradeOrigin};
use mcd_tradelog::TradeLog;

use super::{parse_date_or_today, parse_decimal, parse_opt_date, read_text, Ctx};

/// Execute `mcd init`.
pub fn init(ctx: &Ctx, cash: Option<&str>, force: bool) -> Result<()> {
    let cash = match cash {
        Some(raw) => parse_decimal("--cash", raw)?,
        None => ctx.app.engine.initial_cash,
    };
    let pf = ctx
        .data
        .init(cash, force)
        .with_context(|| format!("init failed: {}", ctx.data.root().display()))?;

    println!("init_ok=true data_dir={}", ctx.data.root().display());
    println!("cash={} initial_equity={}", pf.cash(), pf.initial_equity());
    Ok(())
}

/// Execute `mcd validate`: structural check of a portfolio CSV.
pub fn validate(path: &str) -> Result<()> {
    let holdings = mcd_store::validate_portfolio_file(Path::new(path)).with_context(|| format!("validate failed: {path}"))?;
    println!("valid=true path={path} holdings={}", holdings.len());
    for h in &holdings {
        println!("holding ticker={} shares={} avg_cost={}", h.ticker, h.shares, h.avg_cost);
    }
    Ok(())
}

/// Execute `mcd summary`: count buys and sells in a pending batch file.
pub fn summary(trades_path: &str) -> Result<()> {
    let proposals = load_proposals(trades_path)?;
    let s = BatchSummary::of_proposals(&proposals);
    println!("{s}");
    println!("total={} buys={} sells={}", s.total, s.buys, s.sells);
    Ok(())
}

/// Execute `mcd process`.
///
/// The batch runs against a copy of the stored portfolio. Nothing is written
/// for a dry run or when no trade executed.
pub async fn process(
    ctx: &Ctx,
    trades_path: &str,
    date: Option<&str>,
    origin: TradeOrigin,
    dry_run: bool,
) -> Result<()> {
    let date = parse_date_or_today(date)?;
    let proposals = load_proposals(trades_path)?;
    let stored = ctx.data.load_portfolio()?;
    let executor = TradeExecutor::new(ctx.market_data()?);

    let mut working = stored.clone();
    let outcome = executor.process_proposals(&mut working, &proposals, date, origin).await;
    print_outcome("batch", &outcome);

    // The sweep reports on its own lines so its indices never mix with the
    // batch's.
    let sweep = if ctx.app.execution.sweep_stop_losses {
        let sweep = executor.sweep_stop_losses(&mut working, date).await;
        print_outcome("sweep", &sweep);
        Some(sweep)
    } else {
        None
    };

    let executed: Vec<TradeLogEntry> = outcome
        .executed
        .into_iter()
        .chain(sweep.into_iter().flat_map(|s| s.executed))
        .collect();

    if dry_run {
        println!("dry_run=true committed=false");
        return Ok(());
    }
    if executed.is_empty() {
        println!("committed=false reason=nothing_executed");
        return Ok(());
    }

    ctx.data.commit(&working, &executed, &execution_marks(&executed))?;
    println!("committed=true cash={} holdings={}", working.cash(), working.holdings().len());
    Ok(())
}

/// Execute `mcd log`.
pub fn log(ctx: &Ctx, from: Option<&str>, to: Option<&str>) -> Result<()> {
    let range = DateRange::new(parse_opt_date(from)?, parse_opt_date(to)?);
    if range.is_inverted() {
        anyhow::bail!("--from must not be after --to");
    }
    let entries = ctx.data.trade_log()?.load(&range)?;

    println!("entries={}", entries.len());
    for e in &entries {
        println!(
            "{} {} {} {} @ {} cash_after={} origin={}",
            e.timestamp.to_rfc3339(),
            e.as_of,
            e.action,
            e.ticker,
            e.price,
            e.cash_after,
            e.origin.as_str()
        );
    }
    Ok(())
}

/// `batch` lines count proposals; `sweep` lines count guarded holdings.
fn print_outcome(label: &str, outcome: &BatchOutcome) {
    println!(
        "{label} run_id={} as_of={} processed={} executed={} rejected={} stop_losses={}",
        outcome.run_id,
        outcome.as_of,
        outcome.processed(),
        outcome.executed.len(),
        outcome.rejected.len(),
        outcome.stop_losses_triggered()
    );
    for e in &outcome.executed {
        println!(
            "{label} executed ticker={} action={} shares={} price={} source={} cash_after={}{}",
            e.ticker,
            e.action,
            e.shares,
            e.price,
            e.price_source,
            e.cash_after,
            if e.stop_loss_triggered { " stop_loss=true" } else { "" }
        );
    }
    for r in &outcome.rejected {
        println!("{label} rejected {r}");
    }
    for n in &outcome.notices {
        println!("{label} notice {n}");
    }
}

fn load_proposals(path: &str) -> Result<Vec<TradeProposal>> {
    let text = read_text(path)?;
    parse_proposals_json(&text).with_context(|| format!("trades file rejected: {path}"))
}

/// Latest execution price per ticker in the batch.
fn execution_marks(entries: &[TradeLogEntry]) -> MarkMap {
    mcd_portfolio::marks(entries.iter().map(|e| (e.ticker.as_str(), e.price)))
}
