//! One decision cycle for one instrument.
//!
//! Stages run strictly in sequence, each consuming the previous output:
//!   A. volume profile  ->  B. edge breakout  ->  C. market conditions
//!   ->  D. fusion  ->  trend  ->  gate  ->  risk review
//!
//! Only the risk review suspends. A stage failure, a HOLD signal or a closed
//! gate ends the cycle as HOLD before the reviewer is consulted, and every
//! outcome carries its reason in the audit record.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::SignalConfig;
use crate::core::breakout::EdgeBreakoutDetector;
use crate::core::conditions::ConditionValidator;
use crate::core::fusion::DecisionFusion;
use crate::core::gate::SignalGate;
use crate::core::risk_review::{ReviewContext, RiskReviewStage};
use crate::core::trend::TrendStateClassifier;
use crate::core::volume_profile::VolumeDistributionAnalyzer;
use crate::errors::BotError;
use crate::types::{
    CycleAudit, FusionDecision, GateDecision, KlineBar, MarketConditionSnapshot, SignalAction,
    TrendState, Verdict,
};

/// Result of one cycle: the audit record plus the decision to act on, if approved.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub audit: CycleAudit,
    pub decision: Option<FusionDecision>,
}

impl CycleOutcome {
    pub fn hold(symbol: &str, timestamp: i64, reason: impl Into<String>) -> Self {
        let audit = CycleAudit::hold(symbol, timestamp, reason);
        info!(symbol, reason = %audit.reason, "cycle resolved to HOLD");
        Self {
            audit,
            decision: None,
        }
    }

    /// The approved directional decision, if this cycle produced one.
    pub fn approved(&self) -> Option<&FusionDecision> {
        if self.audit.verdict != Verdict::Approve {
            return None;
        }
        self.decision.as_ref().filter(|d| d.direction.is_some())
    }
}

pub struct DecisionPipeline {
    analyzer: VolumeDistributionAnalyzer,
    detector: EdgeBreakoutDetector,
    validator: ConditionValidator,
    fusion: DecisionFusion,
    classifier: TrendStateClassifier,
    gate: SignalGate,
    review: RiskReviewStage,
}

impl DecisionPipeline {
    pub fn new(config: &SignalConfig, review: RiskReviewStage) -> Self {
        Self {
            analyzer: VolumeDistributionAnalyzer::new(config.volume_profile.clone()),
            detector: EdgeBreakoutDetector::new(config.breakout.clone()),
            validator: ConditionValidator::new(config.conditions.clone()),
            fusion: DecisionFusion::new(config.fusion.clone()),
            classifier: TrendStateClassifier::new(config.trend.clone()),
            gate: SignalGate::new(config.gate.clone()),
            review,
        }
    }

    /// Run one cycle over `bars` (oldest first, current bar last).
    pub async fn run_cycle(
        &self,
        symbol: &str,
        bars: &[KlineBar],
        conditions: &MarketConditionSnapshot,
        cancel: &CancellationToken,
    ) -> CycleOutcome {
        let timestamp = bars.last().map(|b| b.timestamp).unwrap_or_default();
        if cancel.is_cancelled() {
            return CycleOutcome::hold(symbol, timestamp, "cycle cancelled");
        }

        let (decision, trend, gate, context) = match self.score(symbol, timestamp, bars, conditions) {
            Ok(scored) => scored,
            Err(e) => return CycleOutcome::hold(symbol, timestamp, e.to_string()),
        };

        let mut audit = CycleAudit {
            symbol: symbol.to_string(),
            timestamp,
            score_b: Some(decision.score_b),
            score_c: Some(decision.score_c),
            final_score: Some(decision.final_score),
            regime: trend.regime,
            signal: SignalAction::Hold,
            confidence: decision.confidence,
            verdict: Verdict::Reject,
            reason: String::new(),
        };

        if !gate.allowed || decision.signal == SignalAction::Hold {
            audit.reason = if gate.allowed {
                format!(
                    "fused signal HOLD ({} confidence) at score {}",
                    decision.confidence.as_str(),
                    decision.final_score.round_dp(4)
                )
            } else {
                format!("gate rejected: {}", gate.reason)
            };
            info!(
                symbol,
                final_score = %decision.final_score.round_dp(4),
                regime = %trend.regime,
                reason = %audit.reason,
                "cycle resolved to HOLD"
            );
            return CycleOutcome {
                audit,
                decision: Some(decision),
            };
        }

        let verdict = self
            .review
            .review(&decision, &trend, &gate, context, cancel)
            .await;

        audit.verdict = verdict.verdict;
        audit.reason = verdict.rationale;
        if verdict.verdict == Verdict::Approve {
            audit.signal = decision.signal;
        }

        info!(
            symbol,
            signal = %audit.signal,
            verdict = audit.verdict.as_str(),
            final_score = %decision.final_score.round_dp(4),
            regime = %trend.regime,
            reason = %audit.reason,
            "cycle complete"
        );

        CycleOutcome {
            audit,
            decision: Some(decision),
        }
    }

    /// Synchronous stages A through the gate.
    fn score(
        &self,
        symbol: &str,
        timestamp: i64,
        bars: &[KlineBar],
        conditions: &MarketConditionSnapshot,
    ) -> Result<(FusionDecision, TrendState, GateDecision, ReviewContext), BotError> {
        let profile = self.analyzer.analyze(bars)?;
        let breakout = self.detector.detect(bars, &profile)?;
        let condition = self.validator.evaluate(breakout.direction, conditions);

        let decision = self.fusion.fuse(
            symbol,
            timestamp,
            breakout.score,
            condition.score,
            breakout.direction,
            breakout.price,
        )?;

        let trend = self.classifier.classify(bars);
        let gate = self
            .gate
            .evaluate(trend.regime, decision.direction, decision.final_score);

        let context = ReviewContext {
            reference_price: decision.reference_price,
            stop_loss: decision.stop_loss,
            take_profit: decision.take_profit,
            trend_strength: trend.strength,
            gate_reason: gate.reason.clone(),
            breakout_checks: breakout
                .passed_names()
                .into_iter()
                .map(String::from)
                .collect(),
            condition_checks: condition
                .checks
                .iter()
                .filter(|c| c.passed)
                .map(|c| c.name.to_string())
                .collect(),
        };

        Ok((decision, trend, gate, context))
    }
}
