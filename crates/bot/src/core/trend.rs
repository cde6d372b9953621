//! Market regime from the EMA(20/50/100) stack over the trailing 100 bars.

use rust_decimal::Decimal;
use tracing::debug;

use crate::config::TrendParams;
use crate::constants::{EMA_FAST_PERIOD, EMA_MID_PERIOD, EMA_SLOW_PERIOD, MIN_TREND_BARS, PERCENT};
use crate::core::indicators;
use crate::types::{KlineBar, MarketRegime, TrendState};

pub struct TrendStateClassifier {
    params: TrendParams,
}

impl TrendStateClassifier {
    pub fn new(params: TrendParams) -> Self {
        Self { params }
    }

    /// Classify the trailing window. Fewer than 100 bars yields `UNKNOWN`.
    pub fn classify(&self, bars: &[KlineBar]) -> TrendState {
        if bars.len() < MIN_TREND_BARS {
            debug!(
                available = bars.len(),
                required = MIN_TREND_BARS,
                "not enough bars for trend classification"
            );
            return TrendState::unknown();
        }

        let closes: Vec<Decimal> = bars[bars.len() - MIN_TREND_BARS..]
            .iter()
            .map(|b| b.close)
            .collect();

        let (Some(ema_20), Some(ema_50), Some(ema_100)) = (
            indicators::ema_last(&closes, EMA_FAST_PERIOD),
            indicators::ema_last(&closes, EMA_MID_PERIOD),
            indicators::ema_last(&closes, EMA_SLOW_PERIOD),
        ) else {
            return TrendState::unknown();
        };

        if ema_50.is_zero() {
            return TrendState::unknown();
        }

        let separation = (ema_20 - ema_50).abs() / ema_50;
        let wide_enough = separation * PERCENT > self.params.min_separation_percent;

        let regime = if ema_20 > ema_50 && ema_50 > ema_100 && wide_enough {
            MarketRegime::Uptrend
        } else if ema_20 < ema_50 && ema_50 < ema_100 && wide_enough {
            MarketRegime::Downtrend
        } else {
            MarketRegime::Ranging
        };

        let strength =
            (separation * PERCENT / self.params.strength_saturation_percent).min(Decimal::ONE);

        debug!(
            regime = %regime,
            strength = %strength.round_dp(4),
            ema_20 = %ema_20.round_dp(4),
            ema_50 = %ema_50.round_dp(4),
            ema_100 = %ema_100.round_dp(4),
            "trend classified"
        );

        TrendState {
            regime,
            strength,
            ema_20: Some(ema_20),
            ema_50: Some(ema_50),
            ema_100: Some(ema_100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bars_from_closes, ranging_bars};
    use rust_decimal_macros::dec;

    fn classifier() -> TrendStateClassifier {
        TrendStateClassifier::new(TrendParams::default())
    }

    #[test]
    fn test_strictly_rising_closes_uptrend() {
        let closes: Vec<Decimal> = (0..100).map(|i| dec!(100) + Decimal::from(i)).collect();
        let state = classifier().classify(&bars_from_closes(&closes));
        assert_eq!(state.regime, MarketRegime::Uptrend);
        assert!(state.strength > Decimal::ZERO);
    }

    #[test]
    fn test_strictly_falling_closes_downtrend() {
        let closes: Vec<Decimal> = (0..100).map(|i| dec!(300) - Decimal::from(i * 2)).collect();
        let state = classifier().classify(&bars_from_closes(&closes));
        assert_eq!(state.regime, MarketRegime::Downtrend);
    }

    #[test]
    fn test_oscillation_inside_half_percent_band_ranging() {
        let state = classifier().classify(&ranging_bars(100));
        assert_eq!(state.regime, MarketRegime::Ranging);
        assert!(state.strength < dec!(0.1));
    }

    #[test]
    fn test_short_history_unknown() {
        let state = classifier().classify(&ranging_bars(99));
        assert_eq!(state.regime, MarketRegime::Unknown);
        assert_eq!(state.strength, Decimal::ZERO);
        assert!(state.ema_20.is_none());
    }

    #[test]
    fn test_slow_drift_below_separation_is_ranging() {
        // +0.001 per bar: the stack is ordered but the 20/50 gap is tiny.
        let closes: Vec<Decimal> = (0..100).map(|i| dec!(100) + Decimal::from(i) * dec!(0.001)).collect();
        let state = classifier().classify(&bars_from_closes(&closes));
        assert_eq!(state.regime, MarketRegime::Ranging);
    }

    #[test]
    fn test_strength_saturates_at_one() {
        let closes: Vec<Decimal> = (0..100).map(|i| Decimal::from(10 + i * i)).collect();
        let state = classifier().classify(&bars_from_closes(&closes));
        assert_eq!(state.strength, Decimal::ONE);
    }

    #[test]
    fn test_only_trailing_hundred_bars_used() {
        let mut closes: Vec<Decimal> = (0..200).map(|i| dec!(500) - Decimal::from(i * 2)).collect();
        let tail: Vec<Decimal> = (0..100).map(|i| dec!(100) + Decimal::from(i)).collect();
        closes.extend(tail);
        let state = classifier().classify(&bars_from_closes(&closes));
        assert_eq!(state.regime, MarketRegime::Uptrend);
    }
}
