//! Shared builders and collaborator doubles for unit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::core::risk_review::{ReviewRequest, RiskOracle};
use crate::errors::BotError;
use crate::types::{KlineBar, MarketConditionSnapshot, OrderBookSnapshot, RiskVerdict};

// ---------------------------------------------------------------------------
// Bars
// ---------------------------------------------------------------------------

pub(crate) fn bar(
    i: usize,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
) -> KlineBar {
    KlineBar {
        timestamp: 1_700_000_000_000 + i as i64 * 900_000,
        open,
        high,
        low,
        close,
        volume,
    }
}

/// Single-price bar (open = high = low = close).
pub(crate) fn flat_bar(i: usize, price: Decimal, volume: Decimal) -> KlineBar {
    bar(i, price, price, price, price, volume)
}

/// One bar per close, each spanning `close ± 0.1%`, opening at the previous close.
pub(crate) fn bars_from_closes(closes: &[Decimal]) -> Vec<KlineBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            let pad = close * dec!(0.001);
            bar(
                i,
                open,
                open.max(close) + pad,
                open.min(close) - pad,
                close,
                dec!(100),
            )
        })
        .collect()
}

/// Range-bound market: every bar spans [99, 101], closes alternate 100.4 / 99.6
/// and volumes alternate 100 / 120 (mean 110, population σ 10 over any even run).
pub(crate) fn ranging_bars(count: usize) -> Vec<KlineBar> {
    (0..count)
        .map(|i| {
            let (open, close, volume) = if i % 2 == 0 {
                (dec!(99.6), dec!(100.4), dec!(100))
            } else {
                (dec!(100.4), dec!(99.6), dec!(120))
            };
            bar(i, open, dec!(101), dec!(99), close, volume)
        })
        .collect()
}

/// Range-bound window whose last bar prints 2% below the value area on a
/// 2.5σ volume spike, with no wick and no close confirmation.
pub(crate) fn weak_edge_bars() -> Vec<KlineBar> {
    let mut bars = ranging_bars(719);
    bars.push(flat_bar(719, dec!(97), dec!(135)));
    bars
}

/// Same range, ending on two heavy bars that reject below the value area.
/// Every breakout check passes on the last bar (close 98.5).
pub(crate) fn strong_long_bars() -> Vec<KlineBar> {
    let mut bars = ranging_bars(718);
    bars.push(bar(718, dec!(98.5), dec!(98.8), dec!(98.0), dec!(98.2), dec!(200)));
    bars.push(bar(719, dec!(98.3), dec!(98.6), dec!(97.0), dec!(98.5), dec!(210)));
    bars
}

// ---------------------------------------------------------------------------
// Market conditions
// ---------------------------------------------------------------------------

pub(crate) fn book(bid: Decimal, bid_qty: Decimal, ask: Decimal, ask_qty: Decimal) -> OrderBookSnapshot {
    OrderBookSnapshot {
        bids: vec![(bid, bid_qty)],
        asks: vec![(ask, ask_qty)],
        timestamp: 0,
    }
}

pub(crate) fn snapshot(
    order_book: Option<OrderBookSnapshot>,
    funding_rate: Option<Decimal>,
    open_interest_change_pct: Option<Decimal>,
) -> MarketConditionSnapshot {
    MarketConditionSnapshot {
        order_book,
        funding_rate,
        open_interest: open_interest_change_pct.map(|_| dec!(1_000_000)),
        open_interest_change_pct,
    }
}

// ---------------------------------------------------------------------------
// Oracle doubles
// ---------------------------------------------------------------------------

/// Returns a fixed verdict and counts calls.
pub(crate) struct StaticOracle {
    verdict: RiskVerdict,
    calls: AtomicU32,
}

impl StaticOracle {
    pub(crate) fn new(verdict: RiskVerdict) -> Self {
        Self {
            verdict,
            calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RiskOracle for StaticOracle {
    async fn review(&self, _request: &ReviewRequest) -> Result<RiskVerdict, BotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.verdict.clone())
    }
}

/// Always fails at the transport level.
pub(crate) struct FailingOracle;

#[async_trait]
impl RiskOracle for FailingOracle {
    async fn review(&self, _request: &ReviewRequest) -> Result<RiskVerdict, BotError> {
        Err(BotError::ReviewUnavailable {
            reason: "connection refused".into(),
        })
    }
}

/// Approves, but only after `delay`.
pub(crate) struct SlowOracle {
    pub(crate) delay: Duration,
}

#[async_trait]
impl RiskOracle for SlowOracle {
    async fn review(&self, _request: &ReviewRequest) -> Result<RiskVerdict, BotError> {
        tokio::time::sleep(self.delay).await;
        Ok(RiskVerdict::approve("late approval"))
    }
}

/// Tight book, bid-heavy depth, negative funding and rising open interest.
pub(crate) fn supportive_conditions() -> MarketConditionSnapshot {
    snapshot(
        Some(book(dec!(98.49), dec!(150), dec!(98.51), dec!(100))),
        Some(dec!(-0.0001)),
        Some(dec!(1.5)),
    )
}
