//! In-memory exchange for dry-run mode.
//!
//! Fills at the configured mark price shifted by a fixed slippage against
//! the trader. Call counters let callers verify which operations reached the
//! venue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use crate::constants::BPS_PER_UNIT;
use crate::errors::BotError;
use crate::execution::exchange::ExchangeClient;
use crate::types::{OpenOrder, Position, PositionDirection};

#[derive(Debug)]
pub struct PaperExchange {
    slippage: Decimal,
    marks: Mutex<HashMap<String, Decimal>>,
    positions: Mutex<HashMap<String, Position>>,
    open_calls: AtomicU32,
    close_calls: AtomicU32,
    get_calls: AtomicU32,
}

impl PaperExchange {
    pub fn new(slippage_bps: u32) -> Self {
        Self {
            slippage: Decimal::from(slippage_bps) / BPS_PER_UNIT,
            marks: Mutex::new(HashMap::new()),
            positions: Mutex::new(HashMap::new()),
            open_calls: AtomicU32::new(0),
            close_calls: AtomicU32::new(0),
            get_calls: AtomicU32::new(0),
        }
    }

    /// Update the mark price used for fills and mark-to-market.
    pub fn set_mark(&self, symbol: &str, price: Decimal) {
        if let Ok(mut marks) = self.marks.lock() {
            marks.insert(symbol.to_string(), price);
        }
    }

    pub fn open_calls(&self) -> u32 {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> u32 {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn mark(&self, symbol: &str) -> Result<Decimal, BotError> {
        lock(&self.marks)?
            .get(symbol)
            .copied()
            .ok_or_else(|| BotError::ExchangeError {
                reason: format!("no mark price for {symbol}"),
            })
    }

    /// Long entries and short exits pay up; the other two fill below mark.
    fn fill_price(&self, mark: Decimal, side: PositionDirection, entering: bool) -> Decimal {
        let pays_up = matches!(
            (side, entering),
            (PositionDirection::Long, true) | (PositionDirection::Short, false)
        );
        if pays_up {
            mark * (Decimal::ONE + self.slippage)
        } else {
            mark * (Decimal::ONE - self.slippage)
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, BotError> {
    mutex.lock().map_err(|_| BotError::ExchangeError {
        reason: "paper book lock poisoned".into(),
    })
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn open(&self, order: &OpenOrder) -> Result<Position, BotError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let mark = self.mark(&order.symbol)?;

        let mut positions = lock(&self.positions)?;
        if positions.contains_key(&order.symbol) {
            return Err(BotError::ExchangeError {
                reason: format!("{} already has an open paper position", order.symbol),
            });
        }

        let entry = self.fill_price(mark, order.side, true);
        let position = Position {
            symbol: order.symbol.clone(),
            side: order.side,
            size: order.size,
            entry_price: entry,
            current_price: mark,
            leverage: order.leverage,
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
            opened_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as i64,
        };
        positions.insert(order.symbol.clone(), position.clone());

        info!(
            symbol = %order.symbol,
            side = order.side.as_str(),
            size = %order.size,
            entry = %entry,
            "paper position opened"
        );
        Ok(position)
    }

    async fn close(&self, symbol: &str) -> Result<Decimal, BotError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let mark = self.mark(symbol)?;

        let position = lock(&self.positions)?
            .remove(symbol)
            .ok_or_else(|| BotError::ExchangeError {
                reason: format!("no open paper position for {symbol}"),
            })?;

        let exit = self.fill_price(mark, position.side, false);
        info!(symbol, exit = %exit, "paper position closed");
        Ok(exit)
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<Position>, BotError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let mark = lock(&self.marks)?.get(symbol).copied();
        Ok(lock(&self.positions)?.get(symbol).map(|p| {
            let mut p = p.clone();
            if let Some(mark) = mark {
                p.current_price = mark;
            }
            p
        }))
    }
}
