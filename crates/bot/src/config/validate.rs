use anyhow::{bail, Result};
use rust_decimal::Decimal;

use super::types::BotConfig;
use crate::constants::{MIN_PROFILE_BARS, MIN_TREND_BARS};

/// Validate invariants across the merged config that serde alone cannot enforce.
///
/// Called automatically by [`super::load_config`]. All violations are
/// collected and reported together.
pub fn validate_config(config: &BotConfig) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    validate_engine_config(config, &mut errors);
    validate_signals_config(config, &mut errors);
    validate_risk_review_config(config, &mut errors);
    validate_positions_config(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        let msg = format!(
            "Configuration validation failed ({} error{}):\n  - {}",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" },
            errors.join("\n  - ")
        );
        bail!("{msg}");
    }
}

fn in_unit_interval(value: Decimal) -> bool {
    value >= Decimal::ZERO && value <= Decimal::ONE
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

fn validate_engine_config(config: &BotConfig, errors: &mut Vec<String>) {
    let e = &config.engine;

    if e.instruments.is_empty() {
        errors.push("engine.instruments: at least one instrument is required".into());
    }
    if e.interval_seconds == 0 {
        errors.push("engine.interval_seconds: must be > 0".into());
    }
    if e.cycle_deadline_ms == 0 {
        errors.push("engine.cycle_deadline_ms: must be > 0".into());
    }
    if e.market_data_url.trim().is_empty() {
        errors.push("engine.market_data_url: required".into());
    }
    if e.request_timeout_ms == 0 || e.request_timeout_ms >= e.cycle_deadline_ms {
        errors.push(format!(
            "engine.request_timeout_ms ({}) must be > 0 and below the cycle deadline",
            e.request_timeout_ms
        ));
    }

    let needed = config.signals.volume_profile.window_bars.max(MIN_TREND_BARS as u32);
    if e.history_bars < needed {
        errors.push(format!(
            "engine.history_bars ({}) must cover the profile window and trend EMAs ({needed})",
            e.history_bars
        ));
    }
    if e.order_notional_usd <= Decimal::ZERO {
        errors.push(format!(
            "engine.order_notional_usd ({}) must be > 0",
            e.order_notional_usd
        ));
    }
    if e.leverage < Decimal::ONE {
        errors.push(format!("engine.leverage ({}) must be >= 1", e.leverage));
    }
    if e.leverage > config.positions.max_leverage {
        errors.push(format!(
            "engine.leverage ({}) exceeds positions.max_leverage ({})",
            e.leverage, config.positions.max_leverage
        ));
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

fn validate_signals_config(config: &BotConfig, errors: &mut Vec<String>) {
    let s = &config.signals;

    // -- Volume profile ------------------------------------------------------
    let vp = &s.volume_profile;
    if (vp.window_bars as usize) < MIN_PROFILE_BARS {
        errors.push(format!(
            "signals.volume_profile.window_bars ({}) must be >= {MIN_PROFILE_BARS}",
            vp.window_bars
        ));
    }
    if vp.bucket_count < 2 {
        errors.push(format!(
            "signals.volume_profile.bucket_count ({}) must be >= 2",
            vp.bucket_count
        ));
    }
    if vp.value_area_fraction <= Decimal::ZERO || vp.value_area_fraction > Decimal::ONE {
        errors.push(format!(
            "signals.volume_profile.value_area_fraction ({}) must be in (0, 1]",
            vp.value_area_fraction
        ));
    }

    // -- Breakout ------------------------------------------------------------
    let b = &s.breakout;
    for (name, weight) in b.weights.all() {
        if !in_unit_interval(weight) {
            errors.push(format!(
                "signals.breakout.weights.{name} ({weight}) must be in [0, 1]"
            ));
        }
    }
    let total = b.weights.total();
    if total > Decimal::ONE {
        errors.push(format!(
            "signals.breakout.weights sum to {total}, must be <= 1"
        ));
    }
    if b.zscore_lookback < 2 {
        errors.push("signals.breakout.zscore_lookback must be >= 2".into());
    }
    if b.persistence_window == 0 || b.persistence_min_bars > b.persistence_window {
        errors.push(format!(
            "signals.breakout: persistence_min_bars ({}) must be <= persistence_window ({}) and the window non-empty",
            b.persistence_min_bars, b.persistence_window
        ));
    }
    if b.proximity_band_percent < Decimal::ZERO {
        errors.push("signals.breakout.proximity_band_percent must be >= 0".into());
    }
    if !in_unit_interval(b.wick_ratio) {
        errors.push(format!(
            "signals.breakout.wick_ratio ({}) must be in [0, 1]",
            b.wick_ratio
        ));
    }

    // -- Conditions ----------------------------------------------------------
    let c = &s.conditions;
    if c.min_book_imbalance < Decimal::ONE {
        errors.push(format!(
            "signals.conditions.min_book_imbalance ({}) must be >= 1",
            c.min_book_imbalance
        ));
    }
    if c.book_depth_levels == 0 {
        errors.push("signals.conditions.book_depth_levels must be > 0".into());
    }

    // -- Fusion --------------------------------------------------------------
    let f = &s.fusion;
    if !in_unit_interval(f.signal_floor) || !in_unit_interval(f.medium_floor) {
        errors.push("signals.fusion: floors must be in [0, 1]".into());
    }
    if f.medium_floor > f.signal_floor {
        errors.push(format!(
            "signals.fusion.medium_floor ({}) must be <= signal_floor ({})",
            f.medium_floor, f.signal_floor
        ));
    }
    if f.stop_loss_percent <= Decimal::ZERO || f.take_profit_percent <= Decimal::ZERO {
        errors.push("signals.fusion: stop_loss_percent and take_profit_percent must be > 0".into());
    }

    // -- Trend ---------------------------------------------------------------
    if s.trend.strength_saturation_percent <= Decimal::ZERO {
        errors.push("signals.trend.strength_saturation_percent must be > 0".into());
    }
    if s.trend.min_separation_percent < Decimal::ZERO {
        errors.push("signals.trend.min_separation_percent must be >= 0".into());
    }

    // -- Gate ----------------------------------------------------------------
    let g = &s.gate;
    for (name, value) in [
        ("ranging_threshold", g.ranging_threshold),
        ("with_trend_threshold", g.with_trend_threshold),
        ("counter_trend_threshold", g.counter_trend_threshold),
        ("unknown_threshold", g.unknown_threshold),
    ] {
        if !in_unit_interval(value) {
            errors.push(format!("signals.gate.{name} ({value}) must be in [0, 1]"));
        }
    }
}

// ---------------------------------------------------------------------------
// Risk review
// ---------------------------------------------------------------------------

fn validate_risk_review_config(config: &BotConfig, errors: &mut Vec<String>) {
    let r = &config.risk_review;

    if r.enabled && r.base_url.trim().is_empty() {
        errors.push("risk_review.base_url: required when review is enabled".into());
    }
    if r.timeout_ms == 0 {
        errors.push("risk_review.timeout_ms: must be > 0".into());
    }
    if r.timeout_ms >= config.engine.cycle_deadline_ms {
        errors.push(format!(
            "risk_review.timeout_ms ({}) must be below engine.cycle_deadline_ms ({})",
            r.timeout_ms, config.engine.cycle_deadline_ms
        ));
    }
    if !in_unit_interval(r.max_score_divergence) {
        errors.push(format!(
            "risk_review.max_score_divergence ({}) must be in [0, 1]",
            r.max_score_divergence
        ));
    }
    if !in_unit_interval(r.min_final_score) {
        errors.push(format!(
            "risk_review.min_final_score ({}) must be in [0, 1]",
            r.min_final_score
        ));
    }
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

fn validate_positions_config(config: &BotConfig, errors: &mut Vec<String>) {
    let p = &config.positions;

    if p.cache_timeout_seconds == 0 {
        errors.push("positions.cache_timeout_seconds: must be > 0".into());
    }
    if p.max_position_notional_usd <= Decimal::ZERO {
        errors.push("positions.max_position_notional_usd: must be > 0".into());
    }
    if p.max_leverage < Decimal::ONE {
        errors.push(format!(
            "positions.max_leverage ({}) must be >= 1",
            p.max_leverage
        ));
    }
    if p.max_transactions_per_24h == 0 {
        errors.push("positions.max_transactions_per_24h: must be > 0".into());
    }
    if p.paper_slippage_bps > 1_000 {
        errors.push(format!(
            "positions.paper_slippage_bps ({}) must be <= 1000",
            p.paper_slippage_bps
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_valid() {
        validate_config(&BotConfig::default()).expect("defaults should validate");
    }

    #[test]
    fn test_weights_over_one_rejected() {
        let mut config = BotConfig::default();
        config.signals.breakout.weights.edge_proximity = dec!(0.5);
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("weights sum to"), "got: {err}");
    }

    #[test]
    fn test_value_area_fraction_bounds() {
        let mut config = BotConfig::default();
        config.signals.volume_profile.value_area_fraction = Decimal::ZERO;
        assert!(validate_config(&config).is_err());
        config.signals.volume_profile.value_area_fraction = Decimal::ONE;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_short_profile_window_rejected() {
        let mut config = BotConfig::default();
        config.signals.volume_profile.window_bars = 100;
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("window_bars"), "got: {err}");
    }

    #[test]
    fn test_enabled_review_requires_url() {
        let mut config = BotConfig::default();
        config.risk_review.base_url = "  ".into();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("risk_review.base_url"), "got: {err}");

        config.risk_review.enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_errors_are_aggregated() {
        let mut config = BotConfig::default();
        config.engine.instruments.clear();
        config.positions.cache_timeout_seconds = 0;
        config.signals.gate.ranging_threshold = dec!(1.5);
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("(3 errors)"), "got: {err}");
        assert!(err.contains("engine.instruments"));
        assert!(err.contains("cache_timeout_seconds"));
        assert!(err.contains("ranging_threshold"));
    }

    #[test]
    fn test_engine_leverage_bounded_by_safety_limit() {
        let mut config = BotConfig::default();
        config.engine.leverage = dec!(20);
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("exceeds positions.max_leverage"), "got: {err}");
    }
}
