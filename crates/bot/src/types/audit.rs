use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::signal::{ConfidenceBand, MarketRegime, SignalAction, Verdict};

/// Per-cycle audit record emitted for observability and offline analysis.
///
/// Scores are absent when the cycle ended before they were computed
/// (insufficient history, data fetch failure, deadline).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleAudit {
    pub symbol: String,
    pub timestamp: i64,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub score_b: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub score_c: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub final_score: Option<Decimal>,
    pub regime: MarketRegime,
    pub signal: SignalAction,
    pub confidence: ConfidenceBand,
    pub verdict: Verdict,
    pub reason: String,
}

impl CycleAudit {
    /// Record for a cycle that produced no scores at all.
    pub fn hold(symbol: &str, timestamp: i64, reason: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            timestamp,
            score_b: None,
            score_c: None,
            final_score: None,
            regime: MarketRegime::Unknown,
            signal: SignalAction::Hold,
            confidence: ConfidenceBand::Low,
            verdict: Verdict::Reject,
            reason: reason.into(),
        }
    }
}
