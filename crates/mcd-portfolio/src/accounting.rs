use mcd_schemas::normalize_ticker;
use rust_decimal::Decimal;

use crate::types::{Holding, Portfolio, PortfolioError};
use crate::AVG_COST_DP;

impl Portfolio {
    /// Apply a signed share movement and a signed cash movement for `ticker`.
    ///
    /// Rules:
    /// - resulting cash must be >= 0, else `InsufficientFunds`
    /// - resulting shares must be >= 0, else `InsufficientShares`
    /// - both checks run before anything is mutated
    /// - buys (shares_delta > 0) re-average cost; the incoming per-share cost is
    ///   `new_avg_cost` when given, else `-cash_delta / shares_delta`
    /// - sells leave avg_cost alone; selling the last share drops the holding
    /// - shares_delta == 0 is a cash-only movement
    /// - any sum or product that leaves the `Decimal` range is `Overflow`
    ///
    /// Returns the shares held for `ticker` afterwards.
    pub fn apply_delta(
        &mut self,
        ticker: &str,
        shares_delta: Decimal,
        cash_delta: Decimal,
        new_avg_cost: Option<Decimal>,
    ) -> Result<Decimal, PortfolioError> {
        let key = normalize_ticker(ticker);

        let cash_after = self
            .cash
            .checked_add(cash_delta)
            .ok_or(PortfolioError::Overflow("cash"))?;
        if cash_after < Decimal::ZERO {
            return Err(PortfolioError::InsufficientFunds {
                required: -cash_delta,
                available: self.cash,
            });
        }

        let held = self.holdings.get(&key).map_or(Decimal::ZERO, |h| h.shares);
        let shares_after = held
            .checked_add(shares_delta)
            .ok_or(PortfolioError::Overflow("shares"))?;
        if shares_after < Decimal::ZERO {
            return Err(PortfolioError::InsufficientShares {
                ticker: key,
                requested: -shares_delta,
                held,
            });
        }

        let incoming_cost = if shares_delta > Decimal::ZERO {
            let c = match new_avg_cost {
                Some(c) => c,
                None => (-cash_delta)
                    .checked_div(shares_delta)
                    .ok_or(PortfolioError::Overflow("per-share cost"))?,
            };
            if c < Decimal::ZERO {
                return Err(PortfolioError::InvalidCost(c));
            }
            Some(c)
        } else {
            None
        };

        let new_avg = match incoming_cost {
            Some(cost) => {
                let (old_avg, old_shares) = self
                    .holdings
                    .get(&key)
                    .map_or((Decimal::ZERO, Decimal::ZERO), |h| (h.avg_cost, h.shares));
                let total_cost = old_avg
                    .checked_mul(old_shares)
                    .zip(cost.checked_mul(shares_delta))
                    .and_then(|(a, b)| a.checked_add(b))
                    .ok_or(PortfolioError::Overflow("cost basis"))?;
                let avg = total_cost
                    .checked_div(shares_after)
                    .ok_or(PortfolioError::Overflow("average cost"))?;
                Some(avg.round_dp(AVG_COST_DP))
            }
            None => None,
        };

        // checks done; mutate
        self.cash = cash_after;

        if shares_delta == Decimal::ZERO {
            return Ok(held);
        }

        if shares_after == Decimal::ZERO {
            self.holdings.remove(&key);
            return Ok(Decimal::ZERO);
        }

        let h = self
            .holdings
            .entry(key.clone())
            .or_insert_with(|| Holding::new(&key, Decimal::ZERO, Decimal::ZERO));

        if let Some(avg) = new_avg {
            h.avg_cost = avg;
        }
        h.shares = shares_after;

        Ok(shares_after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pf(cash: Decimal) -> Portfolio {
        Portfolio::new(cash).unwrap()
    }

    #[test]
    fn buy_reduces_cash_and_opens_holding() {
        let mut p = pf(dec!(1000));
        let after = p.apply_delta("abc", dec!(10), dec!(-100), None).unwrap();
        assert_eq!(after, dec!(10));
        assert_eq!(p.cash(), dec!(900));
        let h = p.holding("ABC").unwrap();
        assert_eq!(h.avg_cost, dec!(10));
    }

    #[test]
    fn second_buy_reweights_avg_cost() {
        let mut p = pf(dec!(1000));
        p.apply_delta("ABC", dec!(10), dec!(-100), None).unwrap();
        p.apply_delta("ABC", dec!(10), dec!(-120), None).unwrap();
        let h = p.holding("ABC").unwrap();
        assert_eq!(h.shares, dec!(20));
        assert_eq!(h.avg_cost, dec!(11));
        assert_eq!(h.cost_basis(), Some(dec!(220)));
    }

    #[test]
    fn explicit_avg_cost_overrides_cash_implied_cost() {
        let mut p = pf(dec!(1000));
        p.apply_delta("ABC", dec!(4), dec!(0), Some(dec!(2.5))).unwrap();
        assert_eq!(p.cash(), dec!(1000));
        assert_eq!(p.holding("ABC").unwrap().avg_cost, dec!(2.5));
    }

    #[test]
    fn sell_keeps_avg_cost_and_full_sell_removes_holding() {
        let mut p = pf(dec!(1000));
        p.apply_delta("ABC", dec!(10), dec!(-100), None).unwrap();
        p.apply_delta("ABC", dec!(-4), dec!(60), None).unwrap();
        assert_eq!(p.holding("ABC").unwrap().avg_cost, dec!(10));
        assert_eq!(p.shares_of("ABC"), dec!(6));

        let after = p.apply_delta("ABC", dec!(-6), dec!(90), None).unwrap();
        assert_eq!(after, dec!(0));
        assert!(p.holding("ABC").is_none());
        assert_eq!(p.cash(), dec!(1050));
    }

    #[test]
    fn rejected_delta_leaves_state_untouched() {
        let mut p = pf(dec!(50));
        p.apply_delta("ABC", dec!(1), dec!(-10), None).unwrap();
        let before = p.clone();

        let err = p.apply_delta("XYZ", dec!(10), dec!(-100), None).unwrap_err();
        assert_eq!(
            err,
            PortfolioError::InsufficientFunds {
                required: dec!(100),
                available: dec!(40)
            }
        );
        let err = p.apply_delta("ABC", dec!(-2), dec!(20), None).unwrap_err();
        assert!(matches!(err, PortfolioError::InsufficientShares { held, .. } if held == dec!(1)));
        assert_eq!(p, before);
    }

    #[test]
    fn cash_only_delta_is_allowed() {
        let mut p = pf(dec!(10));
        p.apply_delta("", dec!(0), dec!(5), None).unwrap();
        assert_eq!(p.cash(), dec!(15));
        assert!(p.is_empty());
        assert!(p.apply_delta("", dec!(0), dec!(-20), None).is_err());
    }

    #[test]
    fn out_of_range_amounts_are_refused_without_mutation() {
        let mut p = pf(Decimal::MAX);
        let before = p.clone();
        assert_eq!(
            p.apply_delta("", dec!(0), dec!(1), None).unwrap_err(),
            PortfolioError::Overflow("cash")
        );
        assert_eq!(p, before);

        let mut p = pf(dec!(100));
        p.apply_delta("ABC", Decimal::MAX, dec!(0), Some(dec!(0))).unwrap();
        let err = p.apply_delta("ABC", dec!(1), dec!(0), Some(dec!(0))).unwrap_err();
        assert_eq!(err, PortfolioError::Overflow("shares"));
        assert_eq!(p.shares_of("ABC"), Decimal::MAX);
        assert_eq!(p.cash(), dec!(100));
    }

    #[test]
    fn fractional_shares_are_exact() {
        let mut p = pf(dec!(100));
        p.apply_delta("ABC", dec!(0.5), dec!(-5), None).unwrap();
        p.apply_delta("ABC", dec!(-0.5), dec!(6), None).unwrap();
        assert!(p.is_empty());
        assert_eq!(p.cash(), dec!(101));
    }
}
