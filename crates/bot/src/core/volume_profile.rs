//! Volume profile construction (VAH / VAL / VPOC).
//!
//! The trailing window's price range is split into a fixed number of equal
//! buckets. Each bar's volume is spread evenly across every bucket its
//! `[low, high]` range touches. The heaviest bucket is the point of control;
//! the value area grows outward from it one bucket at a time, always taking
//! the heavier neighbour, until it holds the configured share of volume.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::config::VolumeProfileParams;
use crate::errors::BotError;
use crate::types::{KlineBar, VolumeProfile};

pub struct VolumeDistributionAnalyzer {
    params: VolumeProfileParams,
}

impl VolumeDistributionAnalyzer {
    pub fn new(params: VolumeProfileParams) -> Self {
        Self { params }
    }

    /// Build the profile of the last `window_bars` bars (current bar included).
    ///
    /// Pure: identical windows always produce identical profiles.
    pub fn analyze(&self, bars: &[KlineBar]) -> Result<VolumeProfile, BotError> {
        let window_len = self.params.window_bars as usize;
        if window_len == 0 || bars.len() < window_len {
            return Err(BotError::InsufficientHistory {
                stage: "volume_profile",
                required: window_len,
                available: bars.len(),
            });
        }
        let window = &bars[bars.len() - window_len..];

        let mut range_low = window[0].low;
        let mut range_high = window[0].high;
        let mut total_volume = Decimal::ZERO;
        for bar in window {
            if bar.high < bar.low || bar.volume < Decimal::ZERO {
                return Err(BotError::InvalidInput {
                    reason: format!("malformed bar at {}", bar.timestamp),
                });
            }
            range_low = range_low.min(bar.low);
            range_high = range_high.max(bar.high);
            total_volume += bar.volume;
        }

        if total_volume.is_zero() {
            return Err(BotError::InvalidInput {
                reason: "volume profile window has zero volume".into(),
            });
        }

        // Degenerate range: everything traded at one price.
        if range_high == range_low {
            return Ok(VolumeProfile {
                vah: range_high,
                val: range_low,
                vpoc: range_low,
                range_low,
                range_high,
                total_volume,
                value_area_volume: total_volume,
            });
        }

        let bucket_count = self.params.bucket_count.max(1) as usize;
        let step = (range_high - range_low) / Decimal::from(bucket_count as u64);
        let buckets = accumulate(window, range_low, step, bucket_count);

        let poc = point_of_control(&buckets);
        let bucket_total: Decimal = buckets.iter().copied().sum();
        let target = bucket_total * self.params.value_area_fraction;
        let (lo, hi, value_area_volume) = expand_value_area(&buckets, poc, target);

        let profile = VolumeProfile {
            vah: range_low + step * Decimal::from(hi as u64 + 1),
            val: range_low + step * Decimal::from(lo as u64),
            vpoc: range_low + step * (Decimal::from(poc as u64) + dec!(0.5)),
            range_low,
            range_high,
            total_volume,
            value_area_volume,
        };

        debug!(
            val = %profile.val,
            vpoc = %profile.vpoc,
            vah = %profile.vah,
            buckets = hi - lo + 1,
            "volume profile built"
        );

        Ok(profile)
    }
}

fn bucket_index(price: Decimal, range_low: Decimal, step: Decimal, bucket_count: usize) -> usize {
    let raw = ((price - range_low) / step).floor();
    raw.to_usize().unwrap_or(0).min(bucket_count - 1)
}

fn accumulate(
    window: &[KlineBar],
    range_low: Decimal,
    step: Decimal,
    bucket_count: usize,
) -> Vec<Decimal> {
    let mut buckets = vec![Decimal::ZERO; bucket_count];
    for bar in window {
        let first = bucket_index(bar.low, range_low, step, bucket_count);
        let last = bucket_index(bar.high, range_low, step, bucket_count);
        let share = bar.volume / Decimal::from((last - first + 1) as u64);
        for bucket in &mut buckets[first..=last] {
            *bucket += share;
        }
    }
    buckets
}

/// Heaviest bucket; the lowest index wins ties.
fn point_of_control(buckets: &[Decimal]) -> usize {
    let mut best = 0;
    for (i, &volume) in buckets.iter().enumerate().skip(1) {
        if volume > buckets[best] {
            best = i;
        }
    }
    best
}

/// Grow `[lo, hi]` from `poc` until it holds `target` volume or spans every bucket.
///
/// Each step takes the heavier adjacent bucket. On an exact tie the next bucket
/// out on each side decides; if that also ties, the upper side is taken.
fn expand_value_area(buckets: &[Decimal], poc: usize, target: Decimal) -> (usize, usize, Decimal) {
    let last = buckets.len() - 1;
    let (mut lo, mut hi) = (poc, poc);
    let mut acc = buckets[poc];

    while acc < target && (lo > 0 || hi < last) {
        let up = (hi < last).then(|| buckets[hi + 1]);
        let down = (lo > 0).then(|| buckets[lo - 1]);

        let take_up = match (up, down) {
            (Some(u), Some(d)) if u != d => u > d,
            (Some(_), Some(_)) => {
                let up_next = buckets.get(hi + 2).copied().unwrap_or(Decimal::ZERO);
                let down_next = if lo >= 2 { buckets[lo - 2] } else { Decimal::ZERO };
                up_next >= down_next
            }
            (Some(_), None) => true,
            (None, _) => false,
        };

        if take_up {
            hi += 1;
            acc += buckets[hi];
        } else {
            lo -= 1;
            acc += buckets[lo];
        }
    }

    (lo, hi, acc)
}
