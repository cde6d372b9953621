use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::position::PositionDirection;

/// Market regime derived from the EMA(20/50/100) stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    Uptrend,
    Downtrend,
    Ranging,
    /// Not enough history to classify.
    Unknown,
}

impl MarketRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uptrend => "UPTREND",
            Self::Downtrend => "DOWNTREND",
            Self::Ranging => "RANGING",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the trend classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendState {
    pub regime: MarketRegime,
    /// `min(|EMA20 - EMA50| / EMA50 / 5%, 1)`, independent of the regime label.
    #[serde(with = "rust_decimal::serde::str")]
    pub strength: Decimal,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub ema_20: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub ema_50: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub ema_100: Option<Decimal>,
}

impl TrendState {
    pub fn unknown() -> Self {
        Self {
            regime: MarketRegime::Unknown,
            strength: Decimal::ZERO,
            ema_20: None,
            ema_50: None,
            ema_100: None,
        }
    }
}

/// Volume profile landmarks for one candle window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeProfile {
    /// Value Area High.
    #[serde(with = "rust_decimal::serde::str")]
    pub vah: Decimal,
    /// Value Area Low.
    #[serde(with = "rust_decimal::serde::str")]
    pub val: Decimal,
    /// Point of Control (midpoint of the heaviest bucket).
    #[serde(with = "rust_decimal::serde::str")]
    pub vpoc: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub range_low: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub range_high: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_volume: Decimal,
    /// Share of total volume inside [VAL, VAH].
    #[serde(with = "rust_decimal::serde::str")]
    pub value_area_volume: Decimal,
}

/// Result of one weighted breakout check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub name: &'static str,
    #[serde(with = "rust_decimal::serde::str")]
    pub weight: Decimal,
    pub passed: bool,
    pub detail: String,
}

/// Edge breakout hypothesis (Module B output).
#[derive(Debug, Clone, Serialize)]
pub struct BreakoutSignal {
    /// Only asserted when an edge proximity test fired.
    pub direction: Option<PositionDirection>,
    /// Sum of the weights of passed checks, in [0, 1].
    #[serde(with = "rust_decimal::serde::str")]
    pub score: Decimal,
    pub checks: Vec<CheckOutcome>,
    /// Local volume z-score of the current bar, when computable.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub volume_zscore: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
}

impl BreakoutSignal {
    pub fn passed_checks(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.checks.iter().filter(|c| c.passed)
    }

    pub fn passed_names(&self) -> Vec<&'static str> {
        self.passed_checks().map(|c| c.name).collect()
    }
}

/// Market-condition support for a hypothesis (Module C output).
#[derive(Debug, Clone, Serialize)]
pub struct ConditionScore {
    /// `passed / evaluated`, zero when nothing could be evaluated.
    #[serde(with = "rust_decimal::serde::str")]
    pub score: Decimal,
    pub passed_count: u32,
    pub evaluated_count: u32,
    pub checks: Vec<ConditionCheck>,
    /// Data sources that were missing this cycle.
    pub unavailable: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConditionCheck {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// Directional action produced by fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        }
    }

    pub fn from_direction(direction: PositionDirection) -> Self {
        match direction {
            PositionDirection::Long => Self::Buy,
            PositionDirection::Short => Self::Sell,
        }
    }
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

/// Fused decision for one instrument and cycle (Module D output). Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionDecision {
    pub symbol: String,
    pub timestamp: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub score_b: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub score_c: Decimal,
    /// `0.6 * score_b + 0.4 * score_c`.
    #[serde(with = "rust_decimal::serde::str")]
    pub final_score: Decimal,
    pub direction: Option<PositionDirection>,
    pub signal: SignalAction,
    pub confidence: ConfidenceBand,
    #[serde(with = "rust_decimal::serde::str")]
    pub reference_price: Decimal,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub stop_loss: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub take_profit: Option<Decimal>,
}

/// Outcome of the regime-conditioned threshold gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: String,
    /// Final score minus the applicable threshold (negative when rejected).
    #[serde(with = "rust_decimal::serde::str")]
    pub adjusted_score: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub threshold: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Approve,
    Reject,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::Reject => "REJECT",
        }
    }
}

/// Risk-review result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskVerdict {
    pub verdict: Verdict,
    pub rationale: String,
}

impl RiskVerdict {
    pub fn approve(rationale: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Approve,
            rationale: rationale.into(),
        }
    }

    pub fn reject(rationale: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Reject,
            rationale: rationale.into(),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.verdict == Verdict::Approve
    }
}
