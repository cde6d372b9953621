//! Pure numeric helpers shared by the signal stages.
//!
//! No I/O, no side effects. All computations use `Decimal`.

use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::constants::BPS_PER_UNIT;

// ═══════════════════════════════════════════════════════════════════════════
// Moving averages
// ═══════════════════════════════════════════════════════════════════════════

/// Exponential Moving Average series, one value per input price.
///
/// Seeded with the first price; each subsequent value is
/// `(price - prev) * k + prev` with `k = 2 / (period + 1)`.
/// Returns an empty `Vec` for empty input or `period == 0`.
pub fn ema_series(prices: &[Decimal], period: usize) -> Vec<Decimal> {
    let Some(&seed) = prices.first() else {
        return Vec::new();
    };
    if period == 0 {
        return Vec::new();
    }

    let k = dec!(2) / Decimal::from(period as u64 + 1);
    let mut result = Vec::with_capacity(prices.len());
    let mut prev = seed;
    result.push(prev);

    for &price in &prices[1..] {
        prev += (price - prev) * k;
        result.push(prev);
    }

    result
}

/// Last value of [`ema_series`].
pub fn ema_last(prices: &[Decimal], period: usize) -> Option<Decimal> {
    ema_series(prices, period).last().copied()
}

// ═══════════════════════════════════════════════════════════════════════════
// Statistics
// ═══════════════════════════════════════════════════════════════════════════

pub fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().copied().sum::<Decimal>() / Decimal::from(values.len() as u64))
}

/// Population standard deviation, rounded to 16 dp. `None` for an empty sample.
pub fn std_dev(values: &[Decimal]) -> Option<Decimal> {
    let m = mean(values)?;
    let variance = values
        .iter()
        .map(|&v| {
            let diff = v - m;
            diff * diff
        })
        .sum::<Decimal>()
        / Decimal::from(values.len() as u64);

    variance.sqrt().map(|sd| sd.round_dp(16))
}

/// Z-score of `value` against `sample`.
///
/// `None` when the sample has fewer than two points or zero dispersion.
pub fn z_score(value: Decimal, sample: &[Decimal]) -> Option<Decimal> {
    if sample.len() < 2 {
        return None;
    }
    let m = mean(sample)?;
    let sd = std_dev(sample)?;
    if sd.is_zero() {
        return None;
    }
    Some((value - m) / sd)
}

// ═══════════════════════════════════════════════════════════════════════════
// Microstructure
// ═══════════════════════════════════════════════════════════════════════════

/// Bid depth divided by ask depth over the top `levels` of each side.
///
/// `> 1` = more resting bids (buy pressure). `None` when either side is empty.
pub fn bid_ask_ratio(
    bids: &[(Decimal, Decimal)],
    asks: &[(Decimal, Decimal)],
    levels: usize,
) -> Option<Decimal> {
    let bid_vol: Decimal = bids.iter().take(levels).map(|(_, qty)| *qty).sum();
    let ask_vol: Decimal = asks.iter().take(levels).map(|(_, qty)| *qty).sum();

    if bid_vol.is_zero() || ask_vol.is_zero() {
        return None;
    }
    Some(bid_vol / ask_vol)
}

/// Quoted spread in basis points of the mid price.
pub fn spread_bps(best_bid: Decimal, best_ask: Decimal) -> Option<Decimal> {
    let mid = (best_bid + best_ask) / dec!(2);
    if mid <= Decimal::ZERO || best_ask < best_bid {
        return None;
    }
    Some((best_ask - best_bid) / mid * BPS_PER_UNIT)
}
