use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::constants::{DEFAULT_CACHE_TIMEOUT_SECONDS, MIN_PROFILE_BARS};

// ---------------------------------------------------------------------------
// Top-level aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotConfig {
    pub app: AppConfig,
    pub engine: EngineConfig,
    pub signals: SignalConfig,
    pub risk_review: RiskReviewConfig,
    pub positions: PositionConfig,
}

// ---------------------------------------------------------------------------
// app.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: String,
    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".into(),
            file_name: "bot.log".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// engine.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Instruments evaluated every cycle, in any exchange spelling.
    pub instruments: Vec<String>,
    /// Candle timeframe requested from the kline source, e.g. "15m".
    pub interval: String,
    /// Evaluation period; one cycle per closed candle.
    pub interval_seconds: u64,
    /// Bars requested per cycle.
    pub history_bars: u32,
    /// Overall per-cycle deadline. A cycle exceeding it resolves to HOLD.
    pub cycle_deadline_ms: u64,
    /// Quote notional per new position, converted to size at the reference price.
    #[serde(with = "rust_decimal::serde::str")]
    pub order_notional_usd: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub leverage: Decimal,
    /// REST base of the futures market-data venue.
    pub market_data_url: String,
    pub request_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instruments: vec!["BTCUSDT".into(), "ETHUSDT".into()],
            interval: "15m".into(),
            interval_seconds: 900,
            history_bars: 1000,
            cycle_deadline_ms: 20_000,
            order_notional_usd: dec!(1000),
            leverage: dec!(3),
            market_data_url: "https://fapi.binance.com".into(),
            request_timeout_ms: 5_000,
        }
    }
}

// ---------------------------------------------------------------------------
// signals.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub volume_profile: VolumeProfileParams,
    pub breakout: BreakoutParams,
    pub conditions: ConditionParams,
    pub fusion: FusionParams,
    pub trend: TrendParams,
    pub gate: GateConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VolumeProfileParams {
    /// Trailing bars used to build the profile.
    pub window_bars: u32,
    /// Fixed number of price buckets across the window's range.
    pub bucket_count: u32,
    /// Share of total volume the value area must contain.
    #[serde(with = "rust_decimal::serde::str")]
    pub value_area_fraction: Decimal,
}

impl Default for VolumeProfileParams {
    fn default() -> Self {
        Self {
            window_bars: MIN_PROFILE_BARS as u32,
            bucket_count: 50,
            value_area_fraction: dec!(0.70),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakoutParams {
    /// Max distance beyond VAL/VAH, in percent of the edge price.
    #[serde(with = "rust_decimal::serde::str")]
    pub proximity_band_percent: Decimal,
    /// Bars preceding the current one used for the volume z-score.
    pub zscore_lookback: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub zscore_threshold: Decimal,
    /// Min wick-to-range ratio on the breakout side.
    #[serde(with = "rust_decimal::serde::str")]
    pub wick_ratio: Decimal,
    pub persistence_window: u32,
    pub persistence_min_bars: u32,
    pub weights: BreakoutWeights,
}

impl Default for BreakoutParams {
    fn default() -> Self {
        Self {
            proximity_band_percent: dec!(3.0),
            zscore_lookback: 20,
            zscore_threshold: dec!(2.0),
            wick_ratio: dec!(0.5),
            persistence_window: 3,
            persistence_min_bars: 2,
            weights: BreakoutWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakoutWeights {
    #[serde(with = "rust_decimal::serde::str")]
    pub edge_proximity: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub volume_zscore: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub rejection_wick: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub volume_persistence: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub close_confirmation: Decimal,
}

impl BreakoutWeights {
    pub fn total(&self) -> Decimal {
        self.edge_proximity
            + self.volume_zscore
            + self.rejection_wick
            + self.volume_persistence
            + self.close_confirmation
    }

    pub fn all(&self) -> [(&'static str, Decimal); 5] {
        [
            ("edge_proximity", self.edge_proximity),
            ("volume_zscore", self.volume_zscore),
            ("rejection_wick", self.rejection_wick),
            ("volume_persistence", self.volume_persistence),
            ("close_confirmation", self.close_confirmation),
        ]
    }
}

impl Default for BreakoutWeights {
    fn default() -> Self {
        Self {
            edge_proximity: dec!(0.25),
            volume_zscore: dec!(0.20),
            rejection_wick: dec!(0.20),
            volume_persistence: dec!(0.20),
            close_confirmation: dec!(0.15),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConditionParams {
    /// Bid/ask depth ratio required to support a long (inverse for a short).
    #[serde(with = "rust_decimal::serde::str")]
    pub min_book_imbalance: Decimal,
    /// Book levels summed on each side.
    pub book_depth_levels: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub max_spread_bps: Decimal,
    /// Minimum open-interest change (percent) confirming participation.
    #[serde(with = "rust_decimal::serde::str")]
    pub min_open_interest_change_pct: Decimal,
}

impl Default for ConditionParams {
    fn default() -> Self {
        Self {
            min_book_imbalance: dec!(1.2),
            book_depth_levels: 5,
            max_spread_bps: dec!(5),
            min_open_interest_change_pct: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FusionParams {
    /// Fused score at/above which a directional HIGH signal is emitted.
    #[serde(with = "rust_decimal::serde::str")]
    pub signal_floor: Decimal,
    /// Fused score at/above which a HOLD is labelled MEDIUM rather than LOW.
    #[serde(with = "rust_decimal::serde::str")]
    pub medium_floor: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub stop_loss_percent: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub take_profit_percent: Decimal,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            signal_floor: dec!(0.78),
            medium_floor: dec!(0.65),
            stop_loss_percent: dec!(0.6),
            take_profit_percent: dec!(1.2),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrendParams {
    /// Min |EMA20 - EMA50| / EMA50, in percent, for a trending label.
    #[serde(with = "rust_decimal::serde::str")]
    pub min_separation_percent: Decimal,
    /// EMA separation, in percent, at which trend strength saturates to 1.
    #[serde(with = "rust_decimal::serde::str")]
    pub strength_saturation_percent: Decimal,
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            min_separation_percent: dec!(0.5),
            strength_saturation_percent: dec!(5.0),
        }
    }
}

/// Which directions the gate may let through, regardless of regime.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectionalBias {
    pub long_enabled: bool,
    pub short_enabled: bool,
}

impl Default for DirectionalBias {
    fn default() -> Self {
        Self {
            long_enabled: true,
            short_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub bias: DirectionalBias,
    #[serde(with = "rust_decimal::serde::str")]
    pub ranging_threshold: Decimal,
    /// Threshold for a signal aligned with the trend.
    #[serde(with = "rust_decimal::serde::str")]
    pub with_trend_threshold: Decimal,
    /// Threshold for a signal against the trend.
    #[serde(with = "rust_decimal::serde::str")]
    pub counter_trend_threshold: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub unknown_threshold: Decimal,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            bias: DirectionalBias::default(),
            ranging_threshold: dec!(0.60),
            with_trend_threshold: dec!(0.45),
            counter_trend_threshold: dec!(0.65),
            unknown_threshold: dec!(0.55),
        }
    }
}

// ---------------------------------------------------------------------------
// risk_review.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskReviewConfig {
    /// When false the oracle is never consulted and every review rejects.
    pub enabled: bool,
    pub base_url: String,
    pub timeout_ms: u64,
    /// Max |score_b - score_c| before the sources are considered inconsistent.
    #[serde(with = "rust_decimal::serde::str")]
    pub max_score_divergence: Decimal,
    /// Global final-score floor, independent of the gate thresholds.
    #[serde(with = "rust_decimal::serde::str")]
    pub min_final_score: Decimal,
    /// Words or phrases in the rationale that mean "take a reduced-size position".
    /// Matched case-insensitively on whole words; punctuation counts as a space.
    pub reduced_size_keywords: Vec<String>,
}

impl Default for RiskReviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://127.0.0.1:8000".into(),
            timeout_ms: 8_000,
            max_score_divergence: dec!(0.5),
            min_final_score: dec!(0.78),
            reduced_size_keywords: vec![
                "light".into(),
                "lighter".into(),
                "lightly".into(),
                "light position".into(),
                "reduced size".into(),
                "reduce size".into(),
                "smaller position".into(),
                "half size".into(),
                "small size".into(),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// positions.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    /// Route orders to the in-memory paper exchange.
    pub dry_run: bool,
    /// Staleness bound of the position cache.
    pub cache_timeout_seconds: u64,
    #[serde(with = "rust_decimal::serde::str")]
    pub max_position_notional_usd: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub max_leverage: Decimal,
    pub cooldown_between_actions_seconds: u64,
    pub max_transactions_per_24h: u32,
    /// Fill slippage applied by the paper exchange.
    pub paper_slippage_bps: u32,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            cache_timeout_seconds: DEFAULT_CACHE_TIMEOUT_SECONDS,
            max_position_notional_usd: dec!(10_000),
            max_leverage: dec!(10),
            cooldown_between_actions_seconds: 60,
            max_transactions_per_24h: 50,
            paper_slippage_bps: 5,
        }
    }
}
