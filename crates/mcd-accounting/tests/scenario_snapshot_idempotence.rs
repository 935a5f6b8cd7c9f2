use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use mcd_accounting::{DailyAccountant, EquityHistory, PerformanceSeries};
use mcd_md::{MarketDataProvider, QuoteSource, SourceError};
use mcd_portfolio::Portfolio;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Price drifts up by one per calendar day from the 1st.
struct Drift {
    calls: AtomicUsize,
}

#[async_trait]
impl QuoteSource for Drift {
    fn name(&self) -> &str {
        "drift"
    }

    async fn quote(&self, _ticker: &str, date: NaiveDate) -> Result<Decimal, SourceError> {
        use chrono::Datelike;
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Decimal::from(20 + date.day()))
    }
}

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 10, day).unwrap()
}

#[tokio::test]
async fn scenario_same_date_snapshot_is_stable_and_cached() {
    let src = Arc::new(Drift { calls: AtomicUsize::new(0) });
    let md = Arc::new(MarketDataProvider::new(vec![src.clone() as Arc<dyn QuoteSource>]));
    let acct = DailyAccountant::new(md, EquityHistory::new());

    let mut pf = Portfolio::new(dec!(5000)).unwrap();
    pf.apply_delta("AAA", dec!(10), dec!(-200), None).unwrap();
    pf.apply_delta("BBB", dec!(2.5), dec!(-50), None).unwrap();

    let a = acct.compute_snapshot(&pf, d(7), None).await.unwrap();
    let b = acct.compute_snapshot(&pf, d(7), None).await.unwrap();

    assert_eq!(a.total_equity, b.total_equity);
    assert_eq!(a, b);
    assert_eq!(src.calls.load(Ordering::SeqCst), 2, "one fetch per holding");
}

#[tokio::test]
async fn scenario_week_of_snapshots_chains_daily_pnl() {
    let src: Arc<dyn QuoteSource> = Arc::new(Drift { calls: AtomicUsize::new(0) });
    let mut acct = DailyAccountant::new(Arc::new(MarketDataProvider::new(vec![src])), EquityHistory::new());

    let mut pf = Portfolio::new(dec!(1000)).unwrap();
    pf.apply_delta("AAA", dec!(10), dec!(-200), None).unwrap();

    for day in 1..=5 {
        let s = acct.compute_snapshot(&pf, d(day), Some("SPY")).await.unwrap();
        acct.record(&s).unwrap();
    }

    let h = acct.history();
    assert_eq!(h.len(), 5);
    // equity = 800 + 10 * (20 + day)
    assert_eq!(h.records()[0].total_equity, dec!(1010));
    assert_eq!(h.records()[0].daily_pnl, dec!(10));
    assert!(h.records()[1..].iter().all(|r| r.daily_pnl == dec!(10)));
    assert_eq!(h.last().unwrap().cumulative_pnl, dec!(50));

    let perf = PerformanceSeries::build(h, None, None, dec!(100)).unwrap();
    let stats = perf.stats();
    assert_eq!(perf.points.len(), 5);
    assert!(stats.portfolio_return_pct > Decimal::ZERO);
    assert_eq!(stats.max_drawdown_pct, Decimal::ZERO);
    // SPY 21 -> 25
    assert_eq!(stats.benchmark_return_pct, Some(dec!(19.0476)));
}
