use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a futures position or of a directional hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionDirection {
    Long,
    Short,
}

impl PositionDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

/// Lifecycle action on a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionAction {
    Open,
    Close,
}

/// Mirror of one live exchange position.
///
/// The exchange holds the authoritative copy; the cache keeps a time-bounded one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionDirection,
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub entry_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub current_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub leverage: Decimal,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub stop_loss: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub take_profit: Option<Decimal>,
    /// Unix seconds.
    pub opened_at: i64,
}

impl Position {
    /// Notional value at the current mark price.
    pub fn notional(&self) -> Decimal {
        self.size * self.current_price
    }

    /// Unrealized P&L in quote currency.
    pub fn unrealized_pnl(&self) -> Decimal {
        let diff = self.current_price - self.entry_price;
        match self.side {
            PositionDirection::Long => diff * self.size,
            PositionDirection::Short => -diff * self.size,
        }
    }
}

/// Parameters for opening a position through the exchange collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrder {
    pub symbol: String,
    pub side: PositionDirection,
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub leverage: Decimal,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub stop_loss: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub take_profit: Option<Decimal>,
}

/// Persisted record of a position, as held by the position store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRecord {
    pub id: i64,
    pub position: Position,
    pub closed_at: Option<i64>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub exit_price: Option<Decimal>,
    pub close_reason: Option<String>,
}

impl PositionRecord {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

/// Audit event emitted on every successful open or close, for persistence listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionEvent {
    pub symbol: String,
    pub action: PositionAction,
    pub side: PositionDirection,
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    pub reason: String,
    pub timestamp: i64,
}
