//! Regime-conditioned threshold gate over the fused score.
//!
//! | Regime    | Threshold                                        |
//! |-----------|--------------------------------------------------|
//! | RANGING   | 0.60 either way                                  |
//! | UPTREND   | long 0.45, short 0.65                            |
//! | DOWNTREND | short 0.45, long 0.65                            |
//! | UNKNOWN   | 0.55 either way                                  |
//!
//! The directional bias in [`GateConfig`] can switch a direction off
//! entirely, ahead of the table.

use rust_decimal::Decimal;
use tracing::debug;

use crate::config::GateConfig;
use crate::types::{GateDecision, MarketRegime, PositionDirection};

pub struct SignalGate {
    config: GateConfig,
}

impl SignalGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// Threshold applicable to `direction` in `regime`.
    pub fn threshold(&self, regime: MarketRegime, direction: PositionDirection) -> Decimal {
        let c = &self.config;
        match (regime, direction) {
            (MarketRegime::Ranging, _) => c.ranging_threshold,
            (MarketRegime::Unknown, _) => c.unknown_threshold,
            (MarketRegime::Uptrend, PositionDirection::Long)
            | (MarketRegime::Downtrend, PositionDirection::Short) => c.with_trend_threshold,
            (MarketRegime::Uptrend, PositionDirection::Short)
            | (MarketRegime::Downtrend, PositionDirection::Long) => c.counter_trend_threshold,
        }
    }

    pub fn evaluate(
        &self,
        regime: MarketRegime,
        direction: Option<PositionDirection>,
        final_score: Decimal,
    ) -> GateDecision {
        let Some(direction) = direction else {
            return GateDecision {
                allowed: false,
                reason: "no directional hypothesis".into(),
                adjusted_score: Decimal::ZERO,
                threshold: Decimal::ONE,
            };
        };

        let enabled = match direction {
            PositionDirection::Long => self.config.bias.long_enabled,
            PositionDirection::Short => self.config.bias.short_enabled,
        };
        if !enabled {
            return GateDecision {
                allowed: false,
                reason: format!("{} entries disabled by directional bias", direction.as_str()),
                adjusted_score: Decimal::ZERO,
                threshold: Decimal::ONE,
            };
        }

        let threshold = self.threshold(regime, direction);
        let allowed = final_score >= threshold;
        let reason = format!(
            "{} {} score {} {} threshold {}",
            regime,
            direction.as_str(),
            final_score.round_dp(4),
            if allowed { ">=" } else { "<" },
            threshold
        );

        debug!(allowed, %reason, "gate evaluated");

        GateDecision {
            allowed,
            reason,
            adjusted_score: final_score - threshold,
            threshold,
        }
    }
}
