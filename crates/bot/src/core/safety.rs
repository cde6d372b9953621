//! Safety gate: default-to-deny validation in front of every new position.
//!
//! On any internal error the action is blocked (fail-closed, not fail-open).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::config::PositionConfig;
use crate::errors::BotError;

const SECONDS_PER_DAY: u64 = 86_400;

/// Exposure and pacing limits for position actions.
///
/// Atomics for the pause flag, `Mutex` only for the cooldown timer and the
/// 24h action window. All checks return `Err(BotError::SafetyBlocked)`.
pub struct SafetyState {
    max_position_notional: Decimal,
    max_leverage: Decimal,
    global_pause: AtomicBool,
    cooldown: Duration,
    last_action_time: Mutex<Option<Instant>>,
    max_actions_per_24h: u32,
    action_timestamps: Mutex<VecDeque<Instant>>,
}

impl SafetyState {
    pub fn from_config(config: &PositionConfig) -> Self {
        Self {
            max_position_notional: config.max_position_notional_usd,
            max_leverage: config.max_leverage,
            global_pause: AtomicBool::new(false),
            cooldown: Duration::from_secs(config.cooldown_between_actions_seconds),
            last_action_time: Mutex::new(None),
            max_actions_per_24h: config.max_transactions_per_24h,
            action_timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Lockdown mode: paused, zero notional, no actions. Used when config is unusable.
    pub fn lockdown() -> Self {
        warn!("SafetyState entering lockdown mode, no actions will be permitted");
        Self {
            max_position_notional: Decimal::ZERO,
            max_leverage: Decimal::ONE,
            global_pause: AtomicBool::new(true),
            cooldown: Duration::MAX,
            last_action_time: Mutex::new(None),
            max_actions_per_24h: 0,
            action_timestamps: Mutex::new(VecDeque::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Position validation
    // -----------------------------------------------------------------------

    /// Checks, in order: global pause, notional cap, leverage cap, cooldown, 24h limit.
    pub fn can_open_position(&self, notional: Decimal, leverage: Decimal) -> Result<(), BotError> {
        if self.is_paused() {
            return Err(BotError::SafetyBlocked {
                reason: "global pause is active".into(),
            });
        }

        if notional > self.max_position_notional {
            return Err(BotError::SafetyBlocked {
                reason: format!(
                    "position notional ${notional} exceeds max ${max}",
                    max = self.max_position_notional
                ),
            });
        }

        if leverage > self.max_leverage {
            return Err(BotError::SafetyBlocked {
                reason: format!(
                    "leverage {leverage}x exceeds max {max}x",
                    max = self.max_leverage
                ),
            });
        }

        self.check_cooldown()?;
        self.check_daily_limit()?;

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Global pause
    // -----------------------------------------------------------------------

    /// Activate the global pause (emergency kill switch).
    pub fn trigger_global_pause(&self, reason: &str) {
        self.global_pause.store(true, Ordering::SeqCst);
        error!(reason, "GLOBAL PAUSE activated");
    }

    /// Clear the global pause (manual recovery only).
    pub fn resume(&self) {
        self.global_pause.store(false, Ordering::SeqCst);
        info!("global pause cleared, trading resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.global_pause.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Action recording
    // -----------------------------------------------------------------------

    /// Record that an action was taken. Updates the cooldown timer and 24h window.
    pub fn record_action(&self) {
        let now = Instant::now();

        if let Ok(mut last) = self.last_action_time.lock() {
            *last = Some(now);
        }

        if let Ok(mut timestamps) = self.action_timestamps.lock() {
            timestamps.push_back(now);
        }
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn check_cooldown(&self) -> Result<(), BotError> {
        let last = self
            .last_action_time
            .lock()
            .map_err(|_| BotError::SafetyBlocked {
                reason: "cooldown lock poisoned".into(),
            })?;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.cooldown {
                let remaining = (self.cooldown - elapsed).as_secs();
                return Err(BotError::SafetyBlocked {
                    reason: format!("cooldown: {remaining}s remaining"),
                });
            }
        }
        Ok(())
    }

    fn check_daily_limit(&self) -> Result<(), BotError> {
        let mut timestamps = self
            .action_timestamps
            .lock()
            .map_err(|_| BotError::SafetyBlocked {
                reason: "daily limit lock poisoned".into(),
            })?;

        if let Some(cutoff) = Instant::now().checked_sub(Duration::from_secs(SECONDS_PER_DAY)) {
            while timestamps.front().is_some_and(|t| *t < cutoff) {
                timestamps.pop_front();
            }
        }

        if timestamps.len() as u32 >= self.max_actions_per_24h {
            return Err(BotError::SafetyBlocked {
                reason: format!(
                    "daily action limit reached ({max}/24h)",
                    max = self.max_actions_per_24h
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_safety(cooldown_seconds: u64, max_per_day: u32) -> SafetyState {
        SafetyState::from_config(&PositionConfig {
            max_position_notional_usd: dec!(10_000),
            max_leverage: dec!(5),
            cooldown_between_actions_seconds: cooldown_seconds,
            max_transactions_per_24h: max_per_day,
            ..PositionConfig::default()
        })
    }

    #[test]
    fn test_lockdown_blocks_everything() {
        let s = SafetyState::lockdown();
        let err = s
            .can_open_position(dec!(1), dec!(1))
            .expect_err("lockdown should block");
        assert!(err.to_string().contains("global pause"));
    }

    #[test]
    fn test_notional_cap() {
        let s = test_safety(0, 50);
        assert!(s.can_open_position(dec!(5_000), dec!(2)).is_ok());
        let err = s
            .can_open_position(dec!(15_000), dec!(2))
            .expect_err("over-size should block");
        assert!(err.to_string().contains("position notional"));
    }

    #[test]
    fn test_leverage_cap() {
        let s = test_safety(0, 50);
        assert!(s.can_open_position(dec!(1_000), dec!(5)).is_ok());
        let err = s
            .can_open_position(dec!(1_000), dec!(5.5))
            .expect_err("over-leverage should block");
        assert!(err.to_string().contains("leverage"));
    }

    #[test]
    fn test_global_pause_blocks_until_resume() {
        let s = test_safety(0, 50);
        s.trigger_global_pause("test");
        assert!(s.can_open_position(dec!(100), dec!(2)).is_err());
        s.resume();
        assert!(s.can_open_position(dec!(100), dec!(2)).is_ok());
    }

    #[test]
    fn test_cooldown_enforcement() {
        let s = test_safety(60, 50);
        assert!(s.can_open_position(dec!(100), dec!(2)).is_ok());
        s.record_action();
        let err = s
            .can_open_position(dec!(100), dec!(2))
            .expect_err("cooldown should block");
        assert!(err.to_string().contains("cooldown"));
    }

    #[test]
    fn test_daily_action_limit() {
        let s = test_safety(0, 3);
        for _ in 0..3 {
            s.record_action();
        }
        let err = s
            .can_open_position(dec!(100), dec!(2))
            .expect_err("daily limit should block");
        assert!(err.to_string().contains("daily action limit"));
    }

    #[test]
    fn test_default_to_deny_on_poison() {
        let s = test_safety(0, 50);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = s.last_action_time.lock().unwrap();
            panic!("deliberate poison");
        }));
        assert!(result.is_err());
        assert!(s.can_open_position(dec!(100), dec!(2)).is_err());
    }
}
