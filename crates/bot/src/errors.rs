use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::{MarketRegime, PositionDirection};

/// Typed error hierarchy for the breakout bot.
///
/// Pipeline stages and position operations return specific variants; the
/// configuration loader and other application glue wrap with
/// `anyhow::Context` for propagation. Every variant renders as a
/// human-readable reason, which is what ends up in HOLD / REJECT audit records.
#[derive(Error, Debug)]
pub enum BotError {
    // -- Signal construction ------------------------------------------------
    #[error("insufficient history for {stage}: need {required} bars, have {available}")]
    InsufficientHistory {
        stage: &'static str,
        required: usize,
        available: usize,
    },

    #[error("market data unavailable: {source_name}")]
    PartialDataUnavailable { source_name: String },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    // -- Risk review --------------------------------------------------------
    #[error("inconsistent scores: breakout {score_b} vs conditions {score_c} (max divergence {max_divergence})")]
    InconsistentScore {
        score_b: Decimal,
        score_c: Decimal,
        max_divergence: Decimal,
    },

    #[error("counter-trend veto: {direction:?} signal in {regime} regime")]
    CounterTrend {
        direction: PositionDirection,
        regime: MarketRegime,
    },

    #[error("final score {final_score} below review floor {floor}")]
    BelowScoreFloor { final_score: Decimal, floor: Decimal },

    #[error("reviewer advised a reduced-size position: {rationale}")]
    ReducedSizeAdvised { rationale: String },

    #[error("risk-review unavailable: {reason}")]
    ReviewUnavailable { reason: String },

    // -- Position -----------------------------------------------------------
    #[error("no persisted position record for {symbol}")]
    PositionNotFound { symbol: String },

    #[error("position operation already in flight for {symbol}")]
    PositionBusy { symbol: String },

    #[error("position error: {reason}")]
    PositionError { reason: String },

    // -- Safety -------------------------------------------------------------
    #[error("safety gate blocked: {reason}")]
    SafetyBlocked { reason: String },

    // -- Exchange -----------------------------------------------------------
    #[error("exchange error: {reason}")]
    ExchangeError { reason: String },

    // -- Configuration ------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),

    // -- Forwarded errors ---------------------------------------------------
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
