//! Risk review: one bounded consultation of an external oracle plus
//! deterministic overrides. Fail-closed: any doubt resolves to REJECT.
//!
//! Order of evaluation:
//! 1. the gate must have allowed the decision;
//! 2. pre-call overrides (score divergence, counter-trend, global floor);
//!    any of these rejects without consulting the oracle;
//! 3. the oracle call, bounded by `timeout_ms` and the cycle's cancellation
//!    token; timeout, transport failure or cancellation all reject with
//!    `"risk-review unavailable"`;
//! 4. post-call override: an approval whose rationale recommends a reduced
//!    size is turned into a rejection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::RiskReviewConfig;
use crate::constants::REVIEW_UNAVAILABLE_RATIONALE;
use crate::errors::BotError;
use crate::types::{
    FusionDecision, GateDecision, MarketRegime, PositionDirection, RiskVerdict, TrendState,
};

// ---------------------------------------------------------------------------
// Oracle contract
// ---------------------------------------------------------------------------

/// Request sent to the reasoning oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub score_b: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub score_c: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub final_score: Decimal,
    pub regime: MarketRegime,
    pub direction: PositionDirection,
    pub context: ReviewContext,
}

/// Free-form context for the oracle's reasoning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewContext {
    #[serde(with = "rust_decimal::serde::str")]
    pub reference_price: Decimal,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub stop_loss: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub take_profit: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    pub trend_strength: Decimal,
    pub gate_reason: String,
    #[serde(default)]
    pub breakout_checks: Vec<String>,
    #[serde(default)]
    pub condition_checks: Vec<String>,
}

#[async_trait]
pub trait RiskOracle: Send + Sync {
    /// One-shot review. Transport and decoding failures are `Err`.
    async fn review(&self, request: &ReviewRequest) -> Result<RiskVerdict, BotError>;
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

pub struct RiskReviewStage {
    oracle: Arc<dyn RiskOracle>,
    config: RiskReviewConfig,
    reduced_size_keywords: Vec<String>,
}

impl RiskReviewStage {
    pub fn new(oracle: Arc<dyn RiskOracle>, config: RiskReviewConfig) -> Self {
        let reduced_size_keywords = config
            .reduced_size_keywords
            .iter()
            .map(|k| word_padded(k))
            .filter(|k| !k.trim().is_empty())
            .collect();
        Self {
            oracle,
            config,
            reduced_size_keywords,
        }
    }

    /// Review a fused decision that is about to be acted on.
    ///
    /// Never returns an error: every failure is folded into a REJECT verdict
    /// carrying the reason.
    pub async fn review(
        &self,
        decision: &FusionDecision,
        trend: &TrendState,
        gate: &GateDecision,
        context: ReviewContext,
        cancel: &CancellationToken,
    ) -> RiskVerdict {
        if !gate.allowed {
            return RiskVerdict::reject(format!("gate rejected: {}", gate.reason));
        }
        let Some(direction) = decision.direction else {
            return RiskVerdict::reject("no directional hypothesis");
        };

        if let Err(e) = self.pre_call_overrides(decision, direction, trend.regime) {
            info!(symbol = %decision.symbol, reason = %e, "risk override rejected decision");
            return RiskVerdict::reject(e.to_string());
        }

        if !self.config.enabled {
            return self.unavailable(&decision.symbol, "risk review disabled");
        }

        let request = ReviewRequest {
            symbol: decision.symbol.clone(),
            score_b: decision.score_b,
            score_c: decision.score_c,
            final_score: decision.final_score,
            regime: trend.regime,
            direction,
            context,
        };

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let verdict = tokio::select! {
            _ = cancel.cancelled() => {
                return self.unavailable(&decision.symbol, "cycle cancelled");
            }
            result = tokio::time::timeout(timeout, self.oracle.review(&request)) => match result {
                Ok(Ok(verdict)) => verdict,
                Ok(Err(e)) => return self.unavailable(&decision.symbol, &e.to_string()),
                Err(_) => {
                    return self.unavailable(
                        &decision.symbol,
                        &format!("timed out after {}ms", self.config.timeout_ms),
                    );
                }
            },
        };

        if !verdict.is_approved() {
            info!(symbol = %decision.symbol, rationale = %verdict.rationale, "oracle rejected decision");
            return verdict;
        }

        if let Err(e) = self.check_reduced_size(&verdict.rationale) {
            info!(symbol = %decision.symbol, reason = %e, "risk override rejected approval");
            return RiskVerdict::reject(e.to_string());
        }

        info!(
            symbol = %decision.symbol,
            direction = direction.as_str(),
            final_score = %decision.final_score,
            "risk review approved"
        );
        verdict
    }

    fn unavailable(&self, symbol: &str, reason: &str) -> RiskVerdict {
        let err = BotError::ReviewUnavailable {
            reason: reason.to_string(),
        };
        warn!(symbol, error = %err, "failing closed");
        RiskVerdict::reject(REVIEW_UNAVAILABLE_RATIONALE)
    }

    // -----------------------------------------------------------------------
    // Deterministic overrides
    // -----------------------------------------------------------------------

    fn pre_call_overrides(
        &self,
        decision: &FusionDecision,
        direction: PositionDirection,
        regime: MarketRegime,
    ) -> Result<(), BotError> {
        self.check_score_consistency(decision.score_b, decision.score_c)?;
        check_trend_alignment(direction, regime)?;
        self.check_score_floor(decision.final_score)?;
        Ok(())
    }

    /// `|score_b - score_c|` above the limit means the two sources disagree.
    pub fn check_score_consistency(
        &self,
        score_b: Decimal,
        score_c: Decimal,
    ) -> Result<(), BotError> {
        if (score_b - score_c).abs() > self.config.max_score_divergence {
            return Err(BotError::InconsistentScore {
                score_b,
                score_c,
                max_divergence: self.config.max_score_divergence,
            });
        }
        Ok(())
    }

    pub fn check_score_floor(&self, final_score: Decimal) -> Result<(), BotError> {
        if final_score < self.config.min_final_score {
            return Err(BotError::BelowScoreFloor {
                final_score,
                floor: self.config.min_final_score,
            });
        }
        Ok(())
    }

    /// Rejects an approval whose rationale asks for a reduced ("light") position.
    ///
    /// Keywords match whole words, case-insensitively and ignoring punctuation:
    /// `light` catches "keep it light" but not "highlight".
    pub fn check_reduced_size(&self, rationale: &str) -> Result<(), BotError> {
        let words = word_padded(rationale);
        if self
            .reduced_size_keywords
            .iter()
            .any(|k| words.contains(k.as_str()))
        {
            return Err(BotError::ReducedSizeAdvised {
                rationale: rationale.to_string(),
            });
        }
        Ok(())
    }
}

/// Lowercase words separated by single spaces, with a space at each end.
fn word_padded(text: &str) -> String {
    let mut padded = String::with_capacity(text.len() + 2);
    padded.push(' ');
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        padded.push_str(&word.to_lowercase());
        padded.push(' ');
    }
    padded
}

/// Shorts in an uptrend and longs in a downtrend are vetoed.
pub fn check_trend_alignment(
    direction: PositionDirection,
    regime: MarketRegime,
) -> Result<(), BotError> {
    match (direction, regime) {
        (PositionDirection::Short, MarketRegime::Uptrend)
        | (PositionDirection::Long, MarketRegime::Downtrend) => {
            Err(BotError::CounterTrend { direction, regime })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingOracle, SlowOracle, StaticOracle};
    use crate::types::{ConfidenceBand, SignalAction};
    use rust_decimal_macros::dec;

    fn decision(score_b: Decimal, score_c: Decimal, direction: PositionDirection) -> FusionDecision {
        FusionDecision {
            symbol: "BTCUSDT".into(),
            timestamp: 1_700_000_000,
            score_b,
            score_c,
            final_score: dec!(0.6) * score_b + dec!(0.4) * score_c,
            direction: Some(direction),
            signal: SignalAction::from_direction(direction),
            confidence: ConfidenceBand::High,
            reference_price: dec!(100),
            stop_loss: None,
            take_profit: None,
        }
    }

    fn trend(regime: MarketRegime) -> TrendState {
        TrendState {
            regime,
            ..TrendState::unknown()
        }
    }

    fn open_gate() -> GateDecision {
        GateDecision {
            allowed: true,
            reason: "ok".into(),
            adjusted_score: dec!(0.2),
            threshold: dec!(0.6),
        }
    }

    fn stage(oracle: Arc<dyn RiskOracle>) -> RiskReviewStage {
        RiskReviewStage::new(oracle, RiskReviewConfig::default())
    }

    async fn run(stage: &RiskReviewStage, d: &FusionDecision, regime: MarketRegime) -> RiskVerdict {
        stage
            .review(d, &trend(regime), &open_gate(), ReviewContext::default(), &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn test_approval_passes_through() {
        let oracle = Arc::new(StaticOracle::new(RiskVerdict::approve("clean breakout")));
        let s = stage(oracle.clone());
        let v = run(&s, &decision(dec!(0.9), dec!(0.75), PositionDirection::Long), MarketRegime::Ranging).await;
        assert!(v.is_approved());
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_rejects_with_fixed_rationale() {
        let s = stage(Arc::new(FailingOracle));
        let v = run(&s, &decision(dec!(1), dec!(1), PositionDirection::Long), MarketRegime::Uptrend).await;
        assert!(!v.is_approved());
        assert_eq!(v.rationale, "risk-review unavailable");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rejects_regardless_of_scores() {
        let s = stage(Arc::new(SlowOracle {
            delay: Duration::from_secs(60),
        }));
        let v = run(&s, &decision(dec!(1), dec!(1), PositionDirection::Short), MarketRegime::Downtrend).await;
        assert!(!v.is_approved());
        assert_eq!(v.rationale, REVIEW_UNAVAILABLE_RATIONALE);
    }

    #[tokio::test]
    async fn test_cancelled_cycle_rejects() {
        let s = stage(Arc::new(SlowOracle {
            delay: Duration::from_secs(5),
        }));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let v = s
            .review(
                &decision(dec!(1), dec!(1), PositionDirection::Long),
                &trend(MarketRegime::Ranging),
                &open_gate(),
                ReviewContext::default(),
                &cancel,
            )
            .await;
        assert_eq!(v.rationale, REVIEW_UNAVAILABLE_RATIONALE);
    }

    #[tokio::test]
    async fn test_divergent_scores_skip_oracle() {
        let oracle = Arc::new(StaticOracle::new(RiskVerdict::approve("fine")));
        let s = stage(oracle.clone());
        // Final score pinned above the floor so only the divergence rule fires.
        let d = FusionDecision {
            final_score: dec!(0.8),
            ..decision(dec!(1), dec!(0.45), PositionDirection::Long)
        };
        let v = run(&s, &d, MarketRegime::Ranging).await;
        assert!(!v.is_approved());
        assert!(v.rationale.contains("inconsistent scores"));
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_counter_trend_veto() {
        let oracle = Arc::new(StaticOracle::new(RiskVerdict::approve("fine")));
        let s = stage(oracle.clone());
        let short = decision(dec!(1), dec!(1), PositionDirection::Short);
        let v = run(&s, &short, MarketRegime::Uptrend).await;
        assert!(v.rationale.contains("counter-trend"));

        let long = decision(dec!(1), dec!(1), PositionDirection::Long);
        let v = run(&s, &long, MarketRegime::Downtrend).await;
        assert!(v.rationale.contains("counter-trend"));
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_global_floor_independent_of_gate() {
        let oracle = Arc::new(StaticOracle::new(RiskVerdict::approve("fine")));
        let s = stage(oracle.clone());
        // 0.6 * 0.7 + 0.4 * 0.75 = 0.72: the gate allowed it, the floor does not.
        let v = run(&s, &decision(dec!(0.7), dec!(0.75), PositionDirection::Long), MarketRegime::Uptrend).await;
        assert!(!v.is_approved());
        assert!(v.rationale.contains("below review floor"));
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_reduced_size_recommendation_rejects() {
        let oracle = Arc::new(StaticOracle::new(RiskVerdict::approve(
            "Setup is valid but take a LIGHT POSITION given funding",
        )));
        let s = stage(oracle.clone());
        let v = run(&s, &decision(dec!(1), dec!(1), PositionDirection::Long), MarketRegime::Uptrend).await;
        assert!(!v.is_approved());
        assert!(v.rationale.contains("reduced-size"));
        assert_eq!(oracle.calls(), 1);
    }

    #[test]
    fn test_reduced_size_matches_whole_words() {
        let s = stage(Arc::new(StaticOracle::new(RiskVerdict::approve("ok"))));
        for rationale in [
            "approve with a lighter position",
            "keep it light",
            "Light sizing only.",
            "go in lightly",
            "reduced-size entry",
            "take a half-size position",
        ] {
            assert!(
                matches!(s.check_reduced_size(rationale), Err(BotError::ReducedSizeAdvised { .. })),
                "should reject: {rationale}"
            );
        }
        for rationale in ["highlight: clean rejection of VAL", "lightning-fast reclaim", "full size"] {
            assert!(s.check_reduced_size(rationale).is_ok(), "should pass: {rationale}");
        }
    }

    #[tokio::test]
    async fn test_oracle_rejection_kept() {
        let s = stage(Arc::new(StaticOracle::new(RiskVerdict::reject("news risk"))));
        let v = run(&s, &decision(dec!(1), dec!(1), PositionDirection::Long), MarketRegime::Ranging).await;
        assert!(!v.is_approved());
        assert_eq!(v.rationale, "news risk");
    }

    #[tokio::test]
    async fn test_closed_gate_rejects_without_call() {
        let oracle = Arc::new(StaticOracle::new(RiskVerdict::approve("fine")));
        let s = stage(oracle.clone());
        let gate = GateDecision {
            allowed: false,
            reason: "RANGING long score 0.5 < threshold 0.60".into(),
            adjusted_score: dec!(-0.1),
            threshold: dec!(0.6),
        };
        let v = s
            .review(
                &decision(dec!(1), dec!(1), PositionDirection::Long),
                &trend(MarketRegime::Ranging),
                &gate,
                ReviewContext::default(),
                &CancellationToken::new(),
            )
            .await;
        assert!(v.rationale.starts_with("gate rejected"));
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_disabled_review_fails_closed() {
        let oracle = Arc::new(StaticOracle::new(RiskVerdict::approve("fine")));
        let config = RiskReviewConfig {
            enabled: false,
            ..RiskReviewConfig::default()
        };
        let s = RiskReviewStage::new(oracle.clone(), config);
        let v = run(&s, &decision(dec!(1), dec!(1), PositionDirection::Long), MarketRegime::Ranging).await;
        assert_eq!(v.rationale, REVIEW_UNAVAILABLE_RATIONALE);
        assert_eq!(oracle.calls(), 0);
    }
}
