//! Position lifecycle manager.
//!
//! Every operation first normalizes the symbol to one canonical spelling, so
//! the cache, the store and the exchange always agree on keys.
//!
//! Open flow:
//! 1. Reject if the symbol already carries live exposure
//! 2. Safety gate (pause, notional, leverage, cooldown, 24h limit)
//! 3. Exchange open, store record, cache refresh, audit event
//!
//! Close flow:
//! 1. Require an open record in the position store (`PositionNotFound` otherwise)
//! 2. Exchange close, cache clear, audit event, store close
//! 3. A failed store close pauses new entries and is retried on the next
//!    close without another exchange order
//!
//! Operations on one symbol are serialized by a per-symbol lock; a second
//! operation arriving while one is in flight fails with `PositionBusy`.
//! Distinct symbols never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rust_decimal::Decimal;
use tokio::sync::{broadcast, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::core::position_cache::PositionCache;
use crate::core::position_store::PositionStore;
use crate::core::safety::SafetyState;
use crate::errors::BotError;
use crate::execution::ExchangeClient;
use crate::types::{OpenOrder, Position, PositionAction, PositionEvent};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Venue suffixes marking perpetual contracts.
const CONTRACT_SUFFIXES: &[&str] = &["-SWAP", "_PERP", "-PERP", ".P"];

/// Canonical symbol: uppercase base+quote with no separators or contract
/// suffixes. `btc/usdt:usdt`, `BTC-USDT-SWAP` and `BTCUSDT.P` all map to `BTCUSDT`.
pub fn normalize_symbol(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    let mut symbol = upper.split(':').next().unwrap_or_default();
    for suffix in CONTRACT_SUFFIXES {
        if let Some(stripped) = symbol.strip_suffix(suffix) {
            symbol = stripped;
            break;
        }
    }
    symbol
        .chars()
        .filter(|c| !matches!(c, '/' | '-' | '_'))
        .collect()
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// A venue close whose store write failed.
#[derive(Debug, Clone, Copy)]
struct UnrecordedClose {
    id: i64,
    exit_price: Decimal,
    closed_at: i64,
}

pub struct PositionManager {
    exchange: Arc<dyn ExchangeClient>,
    store: Arc<dyn PositionStore>,
    cache: Arc<PositionCache>,
    safety: Arc<SafetyState>,
    symbol_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    unrecorded_closes: Mutex<HashMap<String, UnrecordedClose>>,
    events: broadcast::Sender<PositionEvent>,
}

impl PositionManager {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<dyn PositionStore>,
        cache: Arc<PositionCache>,
        safety: Arc<SafetyState>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            exchange,
            store,
            cache,
            safety,
            symbol_locks: Mutex::new(HashMap::new()),
            unrecorded_closes: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to open/close events (persistence listeners, dashboards).
    pub fn subscribe(&self) -> broadcast::Receiver<PositionEvent> {
        self.events.subscribe()
    }

    pub fn cache(&self) -> &PositionCache {
        &self.cache
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Live exposure on `symbol`: the cache while fresh, the exchange otherwise.
    pub async fn get_position(&self, symbol: &str) -> Result<Option<Position>, BotError> {
        let symbol = normalize_symbol(symbol);
        if let Some(position) = self.cache.get(&symbol) {
            return Ok(Some(position));
        }

        let fetched = self.exchange.get_position(&symbol).await?;
        if let Some(position) = &fetched {
            self.cache.set(position.clone());
        }
        Ok(fetched)
    }

    // -----------------------------------------------------------------------
    // Open
    // -----------------------------------------------------------------------

    /// Open a position. `reference_price` sizes the notional for the safety gate.
    pub async fn open(
        &self,
        mut order: OpenOrder,
        reference_price: Decimal,
        reason: &str,
    ) -> Result<Position, BotError> {
        order.symbol = normalize_symbol(&order.symbol);
        let _guard = self.acquire(&order.symbol)?;

        if self.get_position(&order.symbol).await?.is_some() {
            return Err(BotError::PositionError {
                reason: format!("{} already has an open position", order.symbol),
            });
        }

        let notional = order.size * reference_price;
        self.safety.can_open_position(notional, order.leverage)?;

        let position = self.exchange.open(&order).await?;

        if let Err(e) = self.store.record_open(&position).await {
            // The exposure is live but unrecorded, so the close guard would refuse it.
            self.cache.set(position.clone());
            self.safety
                .trigger_global_pause(&format!("unrecorded position on {}", order.symbol));
            error!(symbol = %order.symbol, error = %e, "failed to persist opened position");
            return Err(e);
        }

        self.cache.set(position.clone());
        self.safety.record_action();

        info!(
            symbol = %position.symbol,
            side = position.side.as_str(),
            size = %position.size,
            entry = %position.entry_price,
            leverage = %position.leverage,
            reason,
            "position opened"
        );
        self.emit(PositionEvent {
            symbol: position.symbol.clone(),
            action: PositionAction::Open,
            side: position.side,
            size: position.size,
            price: position.entry_price,
            reason: reason.to_string(),
            timestamp: unix_now(),
        });

        Ok(position)
    }

    // -----------------------------------------------------------------------
    // Close
    // -----------------------------------------------------------------------

    /// Close the position on `symbol`, returning the exit price.
    ///
    /// Without an open record in the store no order is sent. A close that
    /// reached the venue but could not be recorded pauses new entries; the
    /// next close on the symbol retries the record without a second order.
    pub async fn close(&self, symbol: &str, reason: &str) -> Result<Decimal, BotError> {
        let symbol = normalize_symbol(symbol);
        let _guard = self.acquire(&symbol)?;

        let Some(record) = self.store.find_open(&symbol).await? else {
            warn!(symbol = %symbol, reason, "close refused: no persisted position record");
            return Err(BotError::PositionNotFound { symbol });
        };

        let (exit_price, closed_at) = match self.take_unrecorded_close(&symbol, record.id)? {
            Some(pending) => {
                info!(symbol = %symbol, id = record.id, "retrying unrecorded close");
                (pending.exit_price, pending.closed_at)
            }
            None => {
                let exit_price = self.exchange.close(&symbol).await?;
                let closed_at = unix_now();

                self.cache.clear(&symbol);
                self.safety.record_action();

                info!(
                    symbol = %symbol,
                    side = record.position.side.as_str(),
                    exit = %exit_price,
                    reason,
                    "position closed"
                );
                self.emit(PositionEvent {
                    symbol: symbol.clone(),
                    action: PositionAction::Close,
                    side: record.position.side,
                    size: record.position.size,
                    price: exit_price,
                    reason: reason.to_string(),
                    timestamp: closed_at,
                });
                (exit_price, closed_at)
            }
        };

        if let Err(e) = self
            .store
            .record_close(record.id, exit_price, reason, closed_at)
            .await
        {
            // The venue is flat but the record still reads open.
            self.remember_unrecorded_close(
                &symbol,
                UnrecordedClose {
                    id: record.id,
                    exit_price,
                    closed_at,
                },
            );
            self.safety
                .trigger_global_pause(&format!("unrecorded close on {symbol}"));
            error!(symbol = %symbol, id = record.id, error = %e, "failed to persist close");
            return Err(e);
        }

        Ok(exit_price)
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn acquire(&self, symbol: &str) -> Result<OwnedMutexGuard<()>, BotError> {
        let lock = {
            let mut locks = self.symbol_locks.lock().map_err(|_| BotError::PositionError {
                reason: "symbol lock table poisoned".into(),
            })?;
            Arc::clone(locks.entry(symbol.to_string()).or_default())
        };
        lock.try_lock_owned().map_err(|_| BotError::PositionBusy {
            symbol: symbol.to_string(),
        })
    }

    fn take_unrecorded_close(
        &self,
        symbol: &str,
        id: i64,
    ) -> Result<Option<UnrecordedClose>, BotError> {
        let mut pending = self.unrecorded_closes.lock().map_err(|_| BotError::PositionError {
            reason: "unrecorded close table poisoned".into(),
        })?;
        Ok(pending.remove(symbol).filter(|p| p.id == id))
    }

    fn remember_unrecorded_close(&self, symbol: &str, close: UnrecordedClose) {
        match self.unrecorded_closes.lock() {
            Ok(mut pending) => {
                pending.insert(symbol.to_string(), close);
            }
            Err(_) => error!(symbol, "unrecorded close table poisoned"),
        }
    }

    fn emit(&self, event: PositionEvent) {
        if self.events.send(event).is_err() {
            debug!("no position event listeners");
        }
    }
}
