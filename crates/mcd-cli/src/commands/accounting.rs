//! Valuation and performance command handlers.

use anyhow::{Context, Result};
use mcd_accounting::{render_daily_report, render_performance_report, DailyAccountant, PerformanceSeries};
use mcd_portfolio::MarkMap;

use super::{parse_date_or_today, parse_decimal, parse_opt_date, Ctx};

/// Execute `mcd snapshot`.
pub async fn snapshot(ctx: &Ctx, date: Option<&str>, record: bool) -> Result<()> {
    let date = parse_date_or_today(date)?;
    let pf = ctx.data.load_portfolio()?;
    let history = ctx.data.load_equity_history()?;

    let mut accountant = DailyAccountant::new(ctx.market_data()?, history)
        .with_baseline_equity(ctx.app.performance.baseline_equity)
        .with_baseline_date(ctx.app.engine.baseline_date);

    let snap = accountant
        .compute_snapshot(&pf, date, Some(ctx.app.engine.benchmark.as_str()))
        .await
        .with_context(|| format!("snapshot failed for {date}"))?;

    print!("{}", render_daily_report(&snap));

    if record {
        let rec = accountant.record(&snap)?;
        let marks: MarkMap = snap
            .holdings
            .iter()
            .map(|h| (h.ticker.clone(), h.current_price))
            .collect();
        ctx.data.record_equity(rec, &pf, &marks)?;
        println!("recorded=true date={date}");
    }
    Ok(())
}

/// Execute `mcd performance`.
pub fn performance(ctx: &Ctx, from: Option<&str>, to: Option<&str>, baseline: Option<&str>) -> Result<()> {
    let baseline = match baseline {
        Some(raw) => parse_decimal("--baseline", raw)?,
        None => ctx.app.performance.baseline_equity,
    };
    let history = ctx.data.load_equity_history()?;
    let series = PerformanceSeries::build(&history, parse_opt_date(from)?, parse_opt_date(to)?, baseline)
        .context("performance series unavailable")?;

    println!("date,total_equity,portfolio,benchmark");
    for p in &series.points {
        println!(
            "{},{},{},{}",
            p.date,
            p.total_equity,
            p.portfolio,
            p.benchmark.map(|b| b.to_string()).unwrap_or_default()
        );
    }
    print!("{}", render_performance_report(&series, &ctx.app.engine.benchmark));
    Ok(())
}
