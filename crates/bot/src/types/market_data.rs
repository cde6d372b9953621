use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single OHLCV candle for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineBar {
    /// Candle open time, milliseconds since the epoch.
    pub timestamp: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub open: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub high: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub low: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub close: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub volume: Decimal,
}

/// Top-of-book depth snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    /// (price, quantity) sorted by price descending.
    pub bids: Vec<(Decimal, Decimal)>,
    /// (price, quantity) sorted by price ascending.
    pub asks: Vec<(Decimal, Decimal)>,
    pub timestamp: i64,
}

impl OrderBookSnapshot {
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|(p, _)| *p)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|(p, _)| *p)
    }
}

/// Best-effort market-microstructure snapshot used by the condition validator.
///
/// Every field is independently optional: a missing source removes its checks
/// from the evaluated set instead of failing them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketConditionSnapshot {
    #[serde(default)]
    pub order_book: Option<OrderBookSnapshot>,
    /// Current perpetual funding rate as a fraction (0.0001 = 0.01%).
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub funding_rate: Option<Decimal>,
    /// Open interest in contracts.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub open_interest: Option<Decimal>,
    /// Open interest change over the last timeframe, in percent.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub open_interest_change_pct: Option<Decimal>,
}
