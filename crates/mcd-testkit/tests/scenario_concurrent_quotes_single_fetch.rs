use std::sync::Arc;
use std::time::Duration;

use mcd_testkit::{jan, provider, ScriptedSource};
use rust_decimal_macros::dec;

/// Many concurrent requests for one (ticker, date) reach the source once and
/// all observe the same quote.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_share_one_fetch() {
    let src = Arc::new(
        ScriptedSource::new("slow")
            .with_latency(Duration::from_millis(50))
            .with_price("ABC", jan(2), dec!(12.5)),
    );
    let md = provider(&[src.clone()]);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let md = md.clone();
            // mixed spelling still hits the same key
            let ticker = if i % 2 == 0 { "abc" } else { " ABC " };
            tokio::spawn(async move { md.get_price(ticker, jan(2)).await })
        })
        .collect();

    for h in handles {
        let q = h.await.unwrap().unwrap();
        assert_eq!(q.ticker, "ABC");
        assert_eq!(q.price, dec!(12.5));
    }
    assert_eq!(src.calls(), 1);
}

/// A failed lookup is not cached: once the source recovers, the next request
/// fetches again.
#[tokio::test]
async fn failures_are_not_cached() {
    let src = Arc::new(ScriptedSource::new("flaky").with_price("ABC", jan(2), dec!(7)));
    let md = provider(&[src.clone()]);

    src.fail_all(true);
    assert!(md.get_price("ABC", jan(2)).await.is_err());
    src.fail_all(false);
    assert_eq!(md.get_price("ABC", jan(2)).await.unwrap().price, dec!(7));
    assert_eq!(md.get_price("ABC", jan(2)).await.unwrap().price, dec!(7));
    assert_eq!(src.calls(), 2);

    // Distinct dates are distinct keys.
    assert!(md.get_price("ABC", jan(3)).await.is_err());
    assert_eq!(src.calls(), 3);
}

/// A source slower than the provider timeout counts as a failure and the
/// chain moves on.
#[tokio::test]
async fn slow_primary_times_out_to_fallback() {
    let slow = Arc::new(
        ScriptedSource::new("slow")
            .with_latency(Duration::from_millis(500))
            .with_price("ABC", jan(2), dec!(1)),
    );
    let fast = Arc::new(ScriptedSource::new("fast").with_price("ABC", jan(2), dec!(2)));
    let chain: Vec<Arc<dyn mcd_md::QuoteSource>> = vec![slow, fast];
    let md = mcd_md::MarketDataProvider::new(chain).with_timeout(Duration::from_millis(50));

    let q = md.get_price("ABC", jan(2)).await.unwrap();
    assert_eq!(q.price, dec!(2));
    assert_eq!(q.source, "fast");
    assert_eq!(q.origin, mcd_md::QuoteOrigin::Fallback);
}
