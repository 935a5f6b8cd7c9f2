use std::fmt::Write as _;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::performance::PerformanceSeries;
use crate::snapshot::ValuationSnapshot;

/// `$1,234.56` / `-$1,234.56`
pub fn format_currency(amount: Decimal) -> String {
    let r = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let sign = if r.is_sign_negative() && !r.is_zero() { "-" } else { "" };
    format!("{sign}${}", group_thousands(r.abs()))
}

/// `+1.23%` / `-0.50%`
pub fn format_percentage(value: Decimal) -> String {
    let r = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let sign = if r.is_sign_negative() && !r.is_zero() { "-" } else { "+" };
    format!("{sign}{:.2}%", r.abs())
}

fn group_thousands(v: Decimal) -> String {
    let s = format!("{v:.2}");
    let (int, frac) = s.split_once('.').unwrap_or((s.as_str(), "00"));
    let mut out = String::with_capacity(s.len() + int.len() / 3);
    for (i, ch) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out.push('.');
    out.push_str(frac);
    out
}

/// Plain-text daily summary, one holding per line.
pub fn render_daily_report(s: &ValuationSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Portfolio Summary ({})", s.date);
    let _ = writeln!(out, "Cash: {}", format_currency(s.cash));
    let _ = writeln!(out, "Holdings Value: {}", format_currency(s.holdings_value));
    let _ = writeln!(out, "Total Equity: {}", format_currency(s.total_equity));
    let _ = writeln!(
        out,
        "Daily P&L: {} ({})",
        format_currency(s.daily_pnl),
        format_percentage(s.daily_pnl_pct())
    );
    let _ = writeln!(out, "Cumulative P&L: {}", format_currency(s.cumulative_pnl));
    if let Some(b) = &s.benchmark {
        let _ = writeln!(
            out,
            "Benchmark {}: {} (indexed {} since {})",
            b.ticker,
            format_currency(b.price),
            b.indexed_value.round_dp(2),
            b.baseline_date
        );
    }

    if s.holdings.is_empty() {
        let _ = writeln!(out, "Holdings: none");
        return out;
    }
    let _ = writeln!(out, "Holdings:");
    for h in &s.holdings {
        let _ = write!(
            out,
            "- {}: {} shares @ avg {}, price {}, value {}, P&L {}",
            h.ticker,
            h.shares.normalize(),
            format_currency(h.avg_cost),
            format_currency(h.current_price),
            format_currency(h.market_value),
            format_currency(h.pnl),
        );
        if let Some(stop) = h.stop_loss {
            let _ = write!(out, ", stop {}", format_currency(stop));
        }
        let _ = writeln!(out);
    }
    out
}

pub fn render_performance_report(series: &PerformanceSeries, benchmark: &str) -> String {
    let stats = series.stats();
    let mut out = String::new();
    let _ = writeln!(out, "Performance Summary");
    if let (Some(a), Some(b)) = (series.first_date(), series.last_date()) {
        let _ = writeln!(out, "Period: {a} to {b}");
    }
    let _ = writeln!(out, "Baseline Value: {}", series.baseline.normalize());
    let _ = writeln!(out, "Total Return: {}", format_percentage(stats.portfolio_return_pct));
    match (stats.benchmark_return_pct, stats.alpha_pct) {
        (Some(r), Some(alpha)) => {
            let _ = writeln!(out, "{benchmark} Return: {}", format_percentage(r));
            let _ = writeln!(out, "Alpha vs {benchmark}: {}", format_percentage(alpha));
        }
        _ => {
            let _ = writeln!(out, "{benchmark} Return: n/a");
        }
    }
    let _ = writeln!(out, "Max Drawdown: {}", format_percentage(stats.max_drawdown_pct));
    let _ = writeln!(out, "Data Points: {}", series.points.len());
    out
}
