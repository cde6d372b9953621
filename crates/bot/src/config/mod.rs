pub mod types;
pub mod validate;

pub use types::*;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Load and merge all config JSON files into a single [`BotConfig`],
/// then apply environment variable overrides and validate.
///
/// Expected directory layout:
/// ```text
/// config/
///   app.json
///   engine.json
///   signals.json
///   risk_review.json
///   positions.json
/// ```
///
/// Every file must exist; any key missing inside a file takes its default.
///
/// # Environment variable overrides
///
/// | Env Var                  | Config Field                  |
/// |--------------------------|-------------------------------|
/// | `BOT_DRY_RUN`            | `positions.dry_run`           |
/// | `MAX_LEVERAGE`           | `positions.max_leverage`      |
/// | `ENGINE_INSTRUMENTS`     | `engine.instruments` (CSV)    |
/// | `RISK_REVIEW_URL`        | `risk_review.base_url`        |
/// | `RISK_REVIEW_TIMEOUT_MS` | `risk_review.timeout_ms`      |
/// | `SIGNALS_LONG_ENABLED`   | `signals.gate.bias.long_enabled`  |
/// | `SIGNALS_SHORT_ENABLED`  | `signals.gate.bias.short_enabled` |
pub fn load_config(config_dir: &Path) -> Result<BotConfig> {
    let mut config = BotConfig {
        app: read_json(config_dir, "app.json")?,
        engine: read_json(config_dir, "engine.json")?,
        signals: read_json(config_dir, "signals.json")?,
        risk_review: read_json(config_dir, "risk_review.json")?,
        positions: read_json(config_dir, "positions.json")?,
    };

    apply_env_overrides(&mut config);
    validate::validate_config(&config)?;

    Ok(config)
}

fn read_json<T: DeserializeOwned>(config_dir: &Path, name: &str) -> Result<T> {
    let path = config_dir.join(name);
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {name}"))
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Only non-empty env vars take effect. Parse failures are logged and
/// skipped; the JSON value remains.
fn apply_env_overrides(config: &mut BotConfig) {
    // -- Positions -----------------------------------------------------------
    if let Some(val) = env_bool("BOT_DRY_RUN") {
        info!(dry_run = val, "env override: BOT_DRY_RUN");
        config.positions.dry_run = val;
    }

    if let Some(val) = env_decimal("MAX_LEVERAGE") {
        info!(%val, "env override: MAX_LEVERAGE");
        config.positions.max_leverage = val;
    }

    // -- Engine --------------------------------------------------------------
    if let Some(val) = env_string("ENGINE_INSTRUMENTS") {
        let instruments: Vec<String> = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        info!(count = instruments.len(), "env override: ENGINE_INSTRUMENTS");
        config.engine.instruments = instruments;
    }

    // -- Risk review ---------------------------------------------------------
    if let Some(val) = env_string("RISK_REVIEW_URL") {
        info!("env override: RISK_REVIEW_URL");
        config.risk_review.base_url = val;
    }

    if let Some(val) = env_parse::<u64>("RISK_REVIEW_TIMEOUT_MS") {
        info!(val, "env override: RISK_REVIEW_TIMEOUT_MS");
        config.risk_review.timeout_ms = val;
    }

    // -- Directional bias ----------------------------------------------------
    if let Some(val) = env_bool("SIGNALS_LONG_ENABLED") {
        info!(val, "env override: SIGNALS_LONG_ENABLED");
        config.signals.gate.bias.long_enabled = val;
    }

    if let Some(val) = env_bool("SIGNALS_SHORT_ENABLED") {
        info!(val, "env override: SIGNALS_SHORT_ENABLED");
        config.signals.gate.bias.short_enabled = val;
    }
}

/// Read a non-empty env var as a `String`.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read a non-empty env var as a bool (`true`/`1`/`yes`, `false`/`0`/`no`).
fn env_bool(key: &str) -> Option<bool> {
    let raw = env_string(key)?;
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => {
            warn!(key, value = %raw, "ignoring env override: expected a boolean");
            None
        }
    }
}

fn env_parse<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env_string(key)?;
    match raw.parse() {
        Ok(val) => Some(val),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "ignoring unparsable env override");
            None
        }
    }
}

/// Read a non-empty env var and parse it as `Decimal`.
fn env_decimal(key: &str) -> Option<Decimal> {
    env_parse::<Decimal>(key)
}
