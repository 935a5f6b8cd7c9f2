use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use mcd_execution::{parse_proposals_json, TradeError, TradeExecutor};
use mcd_md::{MarketDataProvider, QuoteSource, SourceError};
use mcd_portfolio::{Portfolio, PortfolioError};
use mcd_schemas::{Action, Trade, TradeOrigin};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

struct Flat(Decimal);

#[async_trait]
impl QuoteSource for Flat {
    fn name(&self) -> &str {
        "flat"
    }

    async fn quote(&self, _ticker: &str, _date: NaiveDate) -> Result<Decimal, SourceError> {
        Ok(self.0)
    }
}

fn executor() -> TradeExecutor {
    let src: Arc<dyn QuoteSource> = Arc::new(Flat(dec!(5)));
    TradeExecutor::new(Arc::new(MarketDataProvider::new(vec![src])))
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 8, 6).unwrap()
}

#[tokio::test]
async fn scenario_failed_sell_does_not_block_following_buy() {
    let ex = executor();
    let mut pf = Portfolio::new(dec!(1000)).unwrap();

    let trades = [
        Trade::market("X", Action::Sell, dec!(100)).unwrap(),
        Trade::market("Y", Action::Buy, dec!(10)).unwrap(),
    ];
    let out = ex.process_trades(&mut pf, &trades, day()).await;

    assert_eq!(out.processed(), trades.len());
    assert_eq!(out.rejected.len(), 1);
    assert_eq!(out.rejected[0].index, 0);
    assert!(out.rejected[0].error.is_insufficient_shares());

    assert_eq!(out.executed.len(), 1);
    assert_eq!(out.executed[0].ticker, "Y");
    assert_eq!(pf.shares_of("Y"), dec!(10));
    assert_eq!(pf.cash(), dec!(950));
}

#[tokio::test]
async fn scenario_trades_apply_strictly_in_input_order() {
    let ex = executor();
    let mut pf = Portfolio::new(dec!(50)).unwrap();

    // buy 10 @5 spends everything; sell 10 refunds; buy 10 again succeeds.
    // Reordered, the second buy would fail for funds.
    let trades = [
        Trade::market("Z", Action::Buy, dec!(10)).unwrap(),
        Trade::market("Z", Action::Buy, dec!(1)).unwrap(),
        Trade::market("Z", Action::Sell, dec!(10)).unwrap(),
        Trade::market("Z", Action::Buy, dec!(10)).unwrap(),
    ];
    let out = ex.process_trades(&mut pf, &trades, day()).await;

    assert_eq!(out.rejected.len(), 1);
    assert_eq!(out.rejected[0].index, 1);
    assert!(out.rejected[0].error.is_insufficient_funds());
    assert_eq!(pf.shares_of("Z"), dec!(10));
    assert_eq!(pf.cash(), dec!(0));

    let stamps: Vec<_> = out.executed.iter().map(|e| e.timestamp).collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn scenario_malformed_proposals_are_rejected_without_aborting_batch() {
    let ex = executor();
    let mut pf = Portfolio::new(dec!(1000)).unwrap();

    let proposals = parse_proposals_json(
        r#"{"trades": [
            {"action": "buy", "ticker": "good", "shares": 2},
            {"action": "short", "ticker": "BAD", "shares": 2},
            {"action": "buy", "ticker": "NEG", "shares": -1},
            {"action": "buy", "ticker": "ALSO", "shares": "3", "stop_loss": 0}
        ]}"#,
    )
    .unwrap();

    let out = ex
        .process_proposals(&mut pf, &proposals, day(), TradeOrigin::Suggested)
        .await;

    assert_eq!(out.processed(), 4);
    let rejected: Vec<usize> = out.rejected.iter().map(|r| r.index).collect();
    assert_eq!(rejected, vec![1, 2]);
    assert!(out
        .rejected
        .iter()
        .all(|r| matches!(r.error, TradeError::Malformed(_)) && r.trade.is_none()));

    let executed: Vec<&str> = out.executed.iter().map(|e| e.ticker.as_str()).collect();
    assert_eq!(executed, vec!["GOOD", "ALSO"]);
    assert!(out.executed.iter().all(|e| e.origin == TradeOrigin::Suggested));
    assert_eq!(pf.holding("ALSO").unwrap().stop_loss, None);
}

#[tokio::test]
async fn scenario_out_of_range_notional_rejects_one_trade_and_batch_continues() {
    let ex = executor();
    let mut pf = Portfolio::new(dec!(1000)).unwrap();

    let proposals = parse_proposals_json(
        r#"[
            {"action": "buy", "ticker": "ABC", "shares": "79228162514264337593543950335"},
            {"action": "sell", "ticker": "ABC", "shares": "79228162514264337593543950335", "price": "2.5"},
            {"action": "buy", "ticker": "XYZ", "shares": 1}
        ]"#,
    )
    .unwrap();

    let out = ex
        .process_proposals(&mut pf, &proposals, day(), TradeOrigin::Suggested)
        .await;

    assert_eq!(out.processed(), 3);
    let rejected: Vec<usize> = out.rejected.iter().map(|r| r.index).collect();
    assert_eq!(rejected, vec![0, 1]);
    assert!(out
        .rejected
        .iter()
        .all(|r| matches!(r.error, TradeError::Portfolio(PortfolioError::Overflow(_)))));

    assert_eq!(out.executed.len(), 1);
    assert_eq!(out.executed[0].ticker, "XYZ");
    assert_eq!(pf.cash(), dec!(995));
    assert!(pf.holding("ABC").is_none());
}
