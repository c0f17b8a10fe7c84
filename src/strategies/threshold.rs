// src/strategies/threshold.rs
use crate::error::{TradingError, TradingResult};
use crate::types::Side;
use crate::utils::precision::normalize_quantity;
use rust_decimal::Decimal;

/// What the rule wants done for one asset this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub side: Side,
    pub volume: Decimal,
    /// Booked into realized PnL once the order is accepted.
    pub pnl_delta: Decimal,
}

/// Buy below `buy_threshold`, sell above `sell_threshold`, hold in between
/// (both bounds inclusive on the hold side).
///
/// Volume is `min(balance, max_trade_notional / price)` for both sides and
/// PnL is booked as `-notional` for a buy and `+notional` for a sell. Fees
/// and exchange minimum order sizes are not modelled.
#[derive(Debug, Clone)]
pub struct ThresholdRule {
    buy_threshold: Decimal,
    sell_threshold: Decimal,
    max_trade_notional: Decimal,
    volume_step: Decimal,
}

impl ThresholdRule {
    pub fn new(
        buy_threshold: Decimal,
        sell_threshold: Decimal,
        max_trade_notional: Decimal,
        volume_step: Decimal,
    ) -> TradingResult<Self> {
        if buy_threshold >= sell_threshold {
            return Err(TradingError::InvalidThresholds {
                buy: buy_threshold,
                sell: sell_threshold,
            });
        }
        Ok(Self {
            buy_threshold,
            sell_threshold,
            max_trade_notional,
            volume_step,
        })
    }

    pub fn evaluate(&self, price: Decimal, balance: Decimal) -> Option<Decision> {
        if price <= Decimal::ZERO {
            return None;
        }

        let (side, pnl_delta) = if price > self.sell_threshold {
            (Side::Sell, self.max_trade_notional)
        } else if price < self.buy_threshold {
            (Side::Buy, -self.max_trade_notional)
        } else {
            return None;
        };

        let volume = normalize_quantity(balance.min(self.max_trade_notional / price), self.volume_step);
        if volume <= Decimal::ZERO {
            return None;
        }

        Some(Decision {
            side,
            volume,
            pnl_delta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rule() -> ThresholdRule {
        ThresholdRule::new(dec!(0.0000075), dec!(0.0000085), dec!(3.0), dec!(1)).unwrap()
    }

    #[test]
    fn test_buy_below_threshold_is_balance_bound() {
        let decision = rule().evaluate(dec!(0.000007), dec!(6000)).unwrap();
        assert_eq!(decision.side, Side::Buy);
        assert_eq!(decision.volume, dec!(6000));
        assert_eq!(decision.pnl_delta, dec!(-3.0));
    }

    #[test]
    fn test_sell_above_threshold_is_notional_bound() {
        // 3.0 / 0.000009 = 333333.33.. -> rounded down to whole units
        let decision = rule().evaluate(dec!(0.000009), dec!(1000000)).unwrap();
        assert_eq!(decision.side, Side::Sell);
        assert_eq!(decision.volume, dec!(333333));
        assert_eq!(decision.pnl_delta, dec!(3.0));
    }

    #[test]
    fn test_hold_between_thresholds_inclusive() {
        let rule = rule();
        assert_eq!(rule.evaluate(dec!(0.0000075), dec!(6000)), None);
        assert_eq!(rule.evaluate(dec!(0.000008), dec!(6000)), None);
        assert_eq!(rule.evaluate(dec!(0.0000085), dec!(6000)), None);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        assert!(matches!(
            ThresholdRule::new(dec!(2), dec!(1), dec!(3), dec!(1)),
            Err(TradingError::InvalidThresholds { .. })
        ));
        assert!(matches!(
            ThresholdRule::new(dec!(1), dec!(1), dec!(3), dec!(1)),
            Err(TradingError::InvalidThresholds { .. })
        ));
    }

    #[test]
    fn test_volume_rounding_to_zero_means_no_trade() {
        assert_eq!(rule().evaluate(dec!(0.000007), dec!(0.5)), None);
    }
}
