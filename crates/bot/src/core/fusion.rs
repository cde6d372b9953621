//! Fuses breakout and condition scores into one decision.
//!
//! `final = 0.6 · score_b + 0.4 · score_c`, then a fixed band table:
//!
//! | final score                      | direction | signal   | confidence |
//! |----------------------------------|-----------|----------|------------|
//! | any                              | none      | HOLD     | LOW        |
//! | `>= signal_floor` (0.78)         | long/short| BUY/SELL | HIGH       |
//! | `[medium_floor, signal_floor)`   | long/short| HOLD     | MEDIUM     |
//! | `< medium_floor` (0.65)          | long/short| HOLD     | LOW        |
//!
//! Stop-loss and take-profit are offsets of the reference price, placed on the
//! losing and winning side of the direction respectively.

use rust_decimal::Decimal;

use crate::config::FusionParams;
use crate::constants::{BREAKOUT_WEIGHT, CONDITION_WEIGHT, PERCENT};
use crate::errors::BotError;
use crate::types::{ConfidenceBand, FusionDecision, PositionDirection, SignalAction};

pub struct DecisionFusion {
    params: FusionParams,
}

impl DecisionFusion {
    pub fn new(params: FusionParams) -> Self {
        Self { params }
    }

    pub fn fuse(
        &self,
        symbol: &str,
        timestamp: i64,
        score_b: Decimal,
        score_c: Decimal,
        direction: Option<PositionDirection>,
        reference_price: Decimal,
    ) -> Result<FusionDecision, BotError> {
        for (name, score) in [("score_b", score_b), ("score_c", score_c)] {
            if score < Decimal::ZERO || score > Decimal::ONE {
                return Err(BotError::InvalidInput {
                    reason: format!("{name} {score} outside [0, 1]"),
                });
            }
        }
        if reference_price <= Decimal::ZERO {
            return Err(BotError::InvalidInput {
                reason: format!("reference price {reference_price} must be positive"),
            });
        }

        let final_score = fused_score(score_b, score_c);

        let (signal, confidence) = match direction {
            None => (SignalAction::Hold, ConfidenceBand::Low),
            Some(dir) if final_score >= self.params.signal_floor => {
                (SignalAction::from_direction(dir), ConfidenceBand::High)
            }
            Some(_) if final_score >= self.params.medium_floor => {
                (SignalAction::Hold, ConfidenceBand::Medium)
            }
            Some(_) => (SignalAction::Hold, ConfidenceBand::Low),
        };

        let (stop_loss, take_profit) = match direction {
            Some(dir) => {
                let (sl, tp) = self.price_targets(dir, reference_price);
                (Some(sl), Some(tp))
            }
            None => (None, None),
        };

        Ok(FusionDecision {
            symbol: symbol.to_string(),
            timestamp,
            score_b,
            score_c,
            final_score,
            direction,
            signal,
            confidence,
            reference_price,
            stop_loss,
            take_profit,
        })
    }

    /// `(stop_loss, take_profit)` for `direction` around `price`.
    pub fn price_targets(&self, direction: PositionDirection, price: Decimal) -> (Decimal, Decimal) {
        let sl = price * self.params.stop_loss_percent / PERCENT;
        let tp = price * self.params.take_profit_percent / PERCENT;
        match direction {
            PositionDirection::Long => (price - sl, price + tp),
            PositionDirection::Short => (price + sl, price - tp),
        }
    }
}

/// `0.6 · score_b + 0.4 · score_c`.
pub fn fused_score(score_b: Decimal, score_c: Decimal) -> Decimal {
    BREAKOUT_WEIGHT * score_b + CONDITION_WEIGHT * score_c
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn fusion() -> DecisionFusion {
        DecisionFusion::new(FusionParams::default())
    }

    fn fuse(score_b: Decimal, score_c: Decimal, dir: Option<PositionDirection>) -> FusionDecision {
        fusion()
            .fuse("BTCUSDT", 1_700_000_000, score_b, score_c, dir, dec!(100))
            .unwrap()
    }

    #[test]
    fn test_weighted_sum_exact_and_bounded() {
        let grid = [dec!(0), dec!(0.15), dec!(0.45), dec!(0.5), dec!(0.8), dec!(1)];
        for &b in &grid {
            for &c in &grid {
                let d = fuse(b, c, Some(PositionDirection::Long));
                assert_eq!(d.final_score, dec!(0.6) * b + dec!(0.4) * c);
                assert!(d.final_score >= Decimal::ZERO && d.final_score <= Decimal::ONE);
            }
        }
    }

    #[test]
    fn test_band_table() {
        let long = Some(PositionDirection::Long);
        let high = fuse(dec!(1), dec!(0.5), long); // 0.80
        assert_eq!((high.signal, high.confidence), (SignalAction::Buy, ConfidenceBand::High));

        let medium = fuse(dec!(0.75), dec!(0.5), long); // 0.65
        assert_eq!((medium.signal, medium.confidence), (SignalAction::Hold, ConfidenceBand::Medium));

        let low = fuse(dec!(0.45), dec!(0.5), long); // 0.47
        assert_eq!((low.signal, low.confidence), (SignalAction::Hold, ConfidenceBand::Low));

        let short = fuse(dec!(0.8), dec!(0.75), Some(PositionDirection::Short)); // 0.78
        assert_eq!((short.signal, short.confidence), (SignalAction::Sell, ConfidenceBand::High));
    }

    #[test]
    fn test_no_direction_always_holds_without_targets() {
        let d = fuse(dec!(1), dec!(1), None);
        assert_eq!(d.signal, SignalAction::Hold);
        assert_eq!(d.confidence, ConfidenceBand::Low);
        assert_eq!(d.stop_loss, None);
        assert_eq!(d.take_profit, None);
    }

    #[test]
    fn test_targets_are_directional() {
        let long = fuse(dec!(1), dec!(1), Some(PositionDirection::Long));
        assert_eq!(long.stop_loss, Some(dec!(99.4)));
        assert_eq!(long.take_profit, Some(dec!(101.2)));

        let short = fuse(dec!(1), dec!(1), Some(PositionDirection::Short));
        assert_eq!(short.stop_loss, Some(dec!(100.6)));
        assert_eq!(short.take_profit, Some(dec!(98.8)));
    }

    #[test]
    fn test_out_of_range_scores_rejected() {
        let err = fusion()
            .fuse("BTCUSDT", 0, dec!(1.2), dec!(0), None, dec!(100))
            .unwrap_err();
        assert!(matches!(err, BotError::InvalidInput { .. }));
    }

    // -----------------------------------------------------------------------
    // proptest: fused score stays between its inputs, BUY/SELL only when HIGH
    // -----------------------------------------------------------------------

    proptest! {
        #[test]
        fn fused_score_between_inputs(b in 0u32..=10_000u32, c in 0u32..=10_000u32) {
            let score_b = Decimal::new(b.into(), 4);
            let score_c = Decimal::new(c.into(), 4);
            let d = fuse(score_b, score_c, Some(PositionDirection::Long));
            prop_assert!(d.final_score >= score_b.min(score_c));
            prop_assert!(d.final_score <= score_b.max(score_c));
        }

        #[test]
        fn directional_signal_only_when_high(b in 0u32..=10_000u32, c in 0u32..=10_000u32, short in any::<bool>()) {
            let dir = if short { PositionDirection::Short } else { PositionDirection::Long };
            let d = fuse(Decimal::new(b.into(), 4), Decimal::new(c.into(), 4), Some(dir));
            let actionable = d.signal != SignalAction::Hold;
            prop_assert_eq!(actionable, d.confidence == ConfidenceBand::High);
            prop_assert_eq!(actionable, d.final_score >= dec!(0.78));
        }
    }
}
