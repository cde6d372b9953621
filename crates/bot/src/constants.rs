use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// History requirements
// ---------------------------------------------------------------------------

/// Minimum bars for the volume profile window.
pub const MIN_PROFILE_BARS: usize = 720;

/// Minimum bars for trend classification (longest EMA period).
pub const MIN_TREND_BARS: usize = 100;

// ---------------------------------------------------------------------------
// Decision fusion
// ---------------------------------------------------------------------------

/// Weight of the breakout score in the fused score.
pub const BREAKOUT_WEIGHT: Decimal = dec!(0.6);

/// Weight of the condition score in the fused score.
pub const CONDITION_WEIGHT: Decimal = dec!(0.4);

// ---------------------------------------------------------------------------
// Trend classification
// ---------------------------------------------------------------------------

pub const EMA_FAST_PERIOD: usize = 20;
pub const EMA_MID_PERIOD: usize = 50;
pub const EMA_SLOW_PERIOD: usize = 100;

// ---------------------------------------------------------------------------
// Risk review
// ---------------------------------------------------------------------------

/// Rationale recorded whenever the reviewer cannot be consulted.
pub const REVIEW_UNAVAILABLE_RATIONALE: &str = "risk-review unavailable";

// ---------------------------------------------------------------------------
// Position cache
// ---------------------------------------------------------------------------

/// Default staleness bound for cached positions.
pub const DEFAULT_CACHE_TIMEOUT_SECONDS: u64 = 30;

// ---------------------------------------------------------------------------
// Misc
// ---------------------------------------------------------------------------

pub const BPS_PER_UNIT: Decimal = dec!(10_000);
pub const PERCENT: Decimal = dec!(100);
