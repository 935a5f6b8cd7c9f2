use std::collections::BTreeMap;

use chrono::NaiveDate;
use mcd_schemas::DateRange;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::history::EquityHistory;
use crate::snapshot::pct_of;
use crate::{AccountingError, NORMALIZED_DP};

/// One date of the normalized comparison.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PerformancePoint {
    pub date: NaiveDate,
    pub total_equity: Decimal,
    pub portfolio: Decimal,
    /// Forward-filled benchmark close; `None` before the first known close.
    pub benchmark_price: Option<Decimal>,
    pub benchmark: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PerformanceSeries {
    pub baseline: Decimal,
    pub points: Vec<PerformancePoint>,
}

impl PerformanceSeries {
    /// Normalized series from the benchmark prices stored alongside each record.
    pub fn build(
        history: &EquityHistory,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        baseline: Decimal,
    ) -> Result<Self, AccountingError> {
        let closes: BTreeMap<NaiveDate, Decimal> = history
            .records()
            .iter()
            .filter_map(|r| r.benchmark_price.map(|p| (r.date, p)))
            .collect();
        Self::build_with_benchmark(history, start, end, baseline, &closes)
    }

    /// Same as [`build`](Self::build) with benchmark closes supplied by the caller.
    ///
    /// The closes may include dates outside the portfolio history; each portfolio
    /// date takes the latest close on or before it.
    pub fn build_with_benchmark(
        history: &EquityHistory,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        baseline: Decimal,
        benchmark_closes: &BTreeMap<NaiveDate, Decimal>,
    ) -> Result<Self, AccountingError> {
        let range = clamp(history, start, end)?;
        let rows: Vec<_> = history.in_range(&range).collect();
        if rows.is_empty() {
            return Err(AccountingError::EmptyRange);
        }

        let equity: Vec<Decimal> = rows.iter().map(|r| r.total_equity).collect();
        let portfolio = normalize(&equity, baseline);

        let filled: Vec<Option<Decimal>> = rows
            .iter()
            .map(|r| benchmark_closes.range(..=r.date).next_back().map(|(_, p)| *p))
            .collect();
        let bench = normalize_available(&filled, baseline);

        let points = rows
            .iter()
            .zip(portfolio)
            .zip(filled.into_iter().zip(bench))
            .map(|((r, p), (bp, b))| PerformancePoint {
                date: r.date,
                total_equity: r.total_equity,
                portfolio: p,
                benchmark_price: bp,
                benchmark: b,
            })
            .collect();

        Ok(Self { baseline, points })
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn stats(&self) -> PerformanceStats {
        PerformanceStats::of(self)
    }
}

fn clamp(
    history: &EquityHistory,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<DateRange, AccountingError> {
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(AccountingError::InvalidRange { start: s, end: e });
        }
    }
    let (Some(first), Some(last)) = (history.first_date(), history.last().map(|r| r.date)) else {
        return Err(AccountingError::EmptyRange);
    };
    let s = start.map_or(first, |d| d.max(first));
    let e = end.map_or(last, |d| d.min(last));
    if s > e {
        return Err(AccountingError::EmptyRange);
    }
    Ok(DateRange::new(Some(s), Some(e)))
}

/// Scale so the first value maps to `baseline`. A zero first value yields zeros.
fn normalize(values: &[Decimal], baseline: Decimal) -> Vec<Decimal> {
    let Some(first) = values.first().copied() else {
        return Vec::new();
    };
    if first.is_zero() {
        return vec![Decimal::ZERO; values.len()];
    }
    values
        .iter()
        .map(|v| (*v / first * baseline).round_dp(NORMALIZED_DP))
        .collect()
}

fn normalize_available(values: &[Option<Decimal>], baseline: Decimal) -> Vec<Option<Decimal>> {
    let Some(first) = values.iter().flatten().next().copied() else {
        return vec![None; values.len()];
    };
    values
        .iter()
        .map(|v| {
            v.map(|v| {
                if first.is_zero() {
                    Decimal::ZERO
                } else {
                    (v / first * baseline).round_dp(NORMALIZED_DP)
                }
            })
        })
        .collect()
}

/// Summary returns over a performance series, in percent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PerformanceStats {
    pub portfolio_return_pct: Decimal,
    pub benchmark_return_pct: Option<Decimal>,
    /// Portfolio return minus benchmark return.
    pub alpha_pct: Option<Decimal>,
    /// Largest peak-to-trough decline of normalized equity (≤ 0).
    pub max_drawdown_pct: Decimal,
}

impl PerformanceStats {
    pub fn of(series: &PerformanceSeries) -> Self {
        let portfolio_return_pct = match (series.points.first(), series.points.last()) {
            (Some(a), Some(b)) => pct_of(b.portfolio - a.portfolio, a.portfolio),
            _ => Decimal::ZERO,
        };

        let bench: Vec<Decimal> = series.points.iter().filter_map(|p| p.benchmark).collect();
        let benchmark_return_pct = match (bench.first(), bench.last()) {
            (Some(a), Some(b)) => Some(pct_of(*b - *a, *a)),
            _ => None,
        };

        let mut peak = Decimal::ZERO;
        let mut max_dd = Decimal::ZERO;
        for p in &series.points {
            peak = peak.max(p.portfolio);
            let dd = pct_of(p.portfolio - peak, peak);
            max_dd = max_dd.min(dd);
        }

        Self {
            portfolio_return_pct,
            benchmark_return_pct,
            alpha_pct: benchmark_return_pct.map(|b| portfolio_return_pct - b),
            max_drawdown_pct: max_dd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::EquityRecord;
    use rust_decimal_macros::dec;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, day).unwrap()
    }

    fn rec(day: u32, equity: Decimal, bench: Option<Decimal>) -> EquityRecord {
        EquityRecord {
            date: d(day),
            cash: equity,
            holdings_value: Decimal::ZERO,
            total_equity: equity,
            daily_pnl: Decimal::ZERO,
            cumulative_pnl: Decimal::ZERO,
            benchmark_ticker: bench.map(|_| "SPY".to_string()),
            benchmark_price: bench,
        }
    }

    fn history() -> EquityHistory {
        EquityHistory::from_records(vec![
            rec(1, dec!(1000), Some(dec!(400))),
            rec(2, dec!(1100), None),
            rec(3, dec!(990), Some(dec!(420))),
            rec(4, dec!(1050), Some(dec!(440))),
        ])
        .unwrap()
    }

    #[test]
    fn normalizes_and_forward_fills() {
        let s = PerformanceSeries::build(&history(), None, None, dec!(100)).unwrap();
        let port: Vec<_> = s.points.iter().map(|p| p.portfolio).collect();
        let bench: Vec<_> = s.points.iter().map(|p| p.benchmark).collect();

        assert_eq!(port, vec![dec!(100), dec!(110), dec!(99), dec!(105)]);
        assert_eq!(
            bench,
            vec![Some(dec!(100)), Some(dec!(100)), Some(dec!(105)), Some(dec!(110))]
        );
        assert_eq!(s.points[1].benchmark_price, Some(dec!(400)));
    }

    #[test]
    fn range_is_clamped_and_renormalized() {
        let s = PerformanceSeries::build(&history(), Some(d(3)), Some(d(30)), dec!(100)).unwrap();
        assert_eq!(s.first_date(), Some(d(3)));
        assert_eq!(s.last_date(), Some(d(4)));
        assert_eq!(s.points[0].portfolio, dec!(100));
        assert_eq!(s.points[0].benchmark, Some(dec!(100)));
    }

    #[test]
    fn inverted_range_is_an_error() {
        let err = PerformanceSeries::build(&history(), Some(d(4)), Some(d(2)), dec!(100)).unwrap_err();
        assert!(matches!(err, AccountingError::InvalidRange { .. }));
    }

    #[test]
    fn empty_history_is_an_error() {
        let err = PerformanceSeries::build(&EquityHistory::new(), None, None, dec!(100)).unwrap_err();
        assert!(matches!(err, AccountingError::EmptyRange));
    }

    #[test]
    fn external_closes_fill_dates_without_a_print() {
        let closes: BTreeMap<_, _> = [(d(1) - chrono::Days::new(3), dec!(50)), (d(3), dec!(55))].into();
        let h = EquityHistory::from_records(vec![rec(1, dec!(10), None), rec(2, dec!(10), None), rec(3, dec!(10), None)])
            .unwrap();
        let s = PerformanceSeries::build_with_benchmark(&h, None, None, dec!(100), &closes).unwrap();
        let bench: Vec<_> = s.points.iter().map(|p| p.benchmark).collect();
        assert_eq!(bench, vec![Some(dec!(100)), Some(dec!(100)), Some(dec!(110))]);
    }

    #[test]
    fn stats_report_return_alpha_and_drawdown() {
        let stats = PerformanceSeries::build(&history(), None, None, dec!(100)).unwrap().stats();
        assert_eq!(stats.portfolio_return_pct, dec!(5));
        assert_eq!(stats.benchmark_return_pct, Some(dec!(10)));
        assert_eq!(stats.alpha_pct, Some(dec!(-5)));
        assert_eq!(stats.max_drawdown_pct, dec!(-10));
    }

    #[test]
    fn zero_starting_equity_normalizes_to_zero() {
        let h = EquityHistory::from_records(vec![rec(1, dec!(0), None), rec(2, dec!(5), None)]).unwrap();
        let s = PerformanceSeries::build(&h, None, None, dec!(100)).unwrap();
        assert!(s.points.iter().all(|p| p.portfolio.is_zero()));
        assert!(s.points.iter().all(|p| p.benchmark.is_none()));
    }
}
