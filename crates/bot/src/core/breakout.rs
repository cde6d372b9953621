//! Edge breakout scoring against the volume profile.
//!
//! Five independent weighted checks; `score` is the sum of the weights that
//! passed. Only the edge-proximity check asserts a direction: without it the
//! hypothesis carries no direction and downstream stages treat it as no signal.
//!
//! | Check                | Passes when                                                   |
//! |----------------------|---------------------------------------------------------------|
//! | `edge_proximity`     | close sits within the band below VAL (long) or above VAH (short) |
//! | `volume_zscore`      | current volume z-score over the lookback exceeds threshold    |
//! | `rejection_wick`     | wick on the breakout side >= `wick_ratio` of the bar's range  |
//! | `volume_persistence` | at an edge, enough recent bars trade above `mean + 1σ`        |
//! | `close_confirmation` | close moved back toward the value area vs. the previous close |

use rust_decimal::Decimal;
use tracing::debug;

use crate::config::BreakoutParams;
use crate::constants::PERCENT;
use crate::core::indicators;
use crate::errors::BotError;
use crate::types::{BreakoutSignal, CheckOutcome, KlineBar, PositionDirection, VolumeProfile};

pub struct EdgeBreakoutDetector {
    params: BreakoutParams,
}

impl EdgeBreakoutDetector {
    pub fn new(params: BreakoutParams) -> Self {
        Self { params }
    }

    /// Bars needed: the z-score lookback plus the current bar.
    pub fn required_bars(&self) -> usize {
        self.params.zscore_lookback as usize + 1
    }

    pub fn detect(
        &self,
        bars: &[KlineBar],
        profile: &VolumeProfile,
    ) -> Result<BreakoutSignal, BotError> {
        let required = self.required_bars().max(self.params.persistence_window as usize);
        if bars.len() < required || bars.len() < 2 {
            return Err(BotError::InsufficientHistory {
                stage: "breakout",
                required: required.max(2),
                available: bars.len(),
            });
        }

        let current = &bars[bars.len() - 1];
        let previous = &bars[bars.len() - 2];
        let lookback_start = bars.len() - 1 - self.params.zscore_lookback as usize;
        let lookback: Vec<Decimal> = bars[lookback_start..bars.len() - 1]
            .iter()
            .map(|b| b.volume)
            .collect();

        let weights = &self.params.weights;
        let mut checks = Vec::with_capacity(5);

        // P1: edge proximity, the only check that asserts a direction.
        let edge = self.edge_direction(current.close, profile);
        checks.push(CheckOutcome {
            name: "edge_proximity",
            weight: weights.edge_proximity,
            passed: edge.is_some(),
            detail: match edge {
                Some(PositionDirection::Long) => {
                    format!("close {} within band below VAL {}", current.close, profile.val)
                }
                Some(PositionDirection::Short) => {
                    format!("close {} within band above VAH {}", current.close, profile.vah)
                }
                None => format!(
                    "close {} not near an edge (VAL {}, VAH {})",
                    current.close, profile.val, profile.vah
                ),
            },
        });

        // P2: volume z-score. Direction from P1, else from the side of VPOC.
        let zscore = indicators::z_score(current.volume, &lookback);
        let side = edge.unwrap_or(if current.close < profile.vpoc {
            PositionDirection::Long
        } else {
            PositionDirection::Short
        });
        checks.push(CheckOutcome {
            name: "volume_zscore",
            weight: weights.volume_zscore,
            passed: zscore.is_some_and(|z| z > self.params.zscore_threshold),
            detail: match zscore {
                Some(z) => format!(
                    "z={} vs threshold {} ({} side)",
                    z.round_dp(3),
                    self.params.zscore_threshold,
                    side.as_str()
                ),
                None => "volume baseline has no dispersion".into(),
            },
        });

        // P3: rejection wick on the breakout side.
        let wick = edge.and_then(|dir| wick_share(current, dir));
        checks.push(CheckOutcome {
            name: "rejection_wick",
            weight: weights.rejection_wick,
            passed: wick.is_some_and(|w| w >= self.params.wick_ratio),
            detail: match wick {
                Some(w) => format!("wick {} of range (min {})", w.round_dp(3), self.params.wick_ratio),
                None => "no edge or zero-range bar".into(),
            },
        });

        // P4: volume persistence over the most recent bars, only at an edge.
        let heavy = self.heavy_bar_count(bars, &lookback);
        checks.push(CheckOutcome {
            name: "volume_persistence",
            weight: weights.volume_persistence,
            passed: edge.is_some() && heavy.is_some_and(|n| n >= self.params.persistence_min_bars),
            detail: match heavy {
                Some(_) if edge.is_none() => "no edge".into(),
                Some(n) => format!(
                    "{n}/{} recent bars above mean+1σ (min {})",
                    self.params.persistence_window, self.params.persistence_min_bars
                ),
                None => "volume baseline unavailable".into(),
            },
        });

        // P5: close moved back toward the value area.
        let confirmed = edge.map(|dir| match dir {
            PositionDirection::Long => current.close > previous.close,
            PositionDirection::Short => current.close < previous.close,
        });
        checks.push(CheckOutcome {
            name: "close_confirmation",
            weight: weights.close_confirmation,
            passed: confirmed.unwrap_or(false),
            detail: format!("close {} vs previous {}", current.close, previous.close),
        });

        let score = checks
            .iter()
            .filter(|c| c.passed)
            .map(|c| c.weight)
            .sum::<Decimal>()
            .min(Decimal::ONE);

        let signal = BreakoutSignal {
            direction: edge,
            score,
            checks,
            volume_zscore: zscore,
            price: current.close,
        };

        debug!(
            direction = ?signal.direction,
            score = %signal.score,
            passed = ?signal.passed_names(),
            "breakout checks evaluated"
        );

        Ok(signal)
    }

    /// Long when the close is in `[VAL·(1 − band), VAL)`, short when in `(VAH, VAH·(1 + band)]`.
    fn edge_direction(&self, close: Decimal, profile: &VolumeProfile) -> Option<PositionDirection> {
        let band = self.params.proximity_band_percent / PERCENT;
        if close < profile.val && close >= profile.val * (Decimal::ONE - band) {
            Some(PositionDirection::Long)
        } else if close > profile.vah && close <= profile.vah * (Decimal::ONE + band) {
            Some(PositionDirection::Short)
        } else {
            None
        }
    }

    fn heavy_bar_count(&self, bars: &[KlineBar], lookback: &[Decimal]) -> Option<u32> {
        if lookback.len() < 2 {
            return None;
        }
        let cutoff = indicators::mean(lookback)? + indicators::std_dev(lookback)?;
        let window = (self.params.persistence_window as usize).min(bars.len());
        Some(
            bars[bars.len() - window..]
                .iter()
                .filter(|b| b.volume > cutoff)
                .count() as u32,
        )
    }
}

/// Wick on the breakout side as a share of the bar's range.
/// Long setups look at the lower wick, short setups at the upper one.
fn wick_share(bar: &KlineBar, direction: PositionDirection) -> Option<Decimal> {
    let range = bar.high - bar.low;
    if range <= Decimal::ZERO {
        return None;
    }
    let wick = match direction {
        PositionDirection::Long => bar.open.min(bar.close) - bar.low,
        PositionDirection::Short => bar.high - bar.open.max(bar.close),
    };
    Some(wick / range)
}
