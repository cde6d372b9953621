//! Persistent record of positions the system has opened.
//!
//! The manager consults this store before every close: an exposure with no
//! open record here is never closed. Durable engines live outside this crate
//! and implement [`PositionStore`]; [`InMemoryPositionStore`] backs dry runs
//! and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::errors::BotError;
use crate::types::{Position, PositionRecord};

#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Persist a newly opened position and return its record id.
    async fn record_open(&self, position: &Position) -> Result<i64, BotError>;

    /// Open record for a canonical symbol, if any.
    async fn find_open(&self, symbol: &str) -> Result<Option<PositionRecord>, BotError>;

    /// Mark the record closed.
    async fn record_close(
        &self,
        id: i64,
        exit_price: Decimal,
        reason: &str,
        closed_at: i64,
    ) -> Result<(), BotError>;
}

#[derive(Default)]
struct StoreInner {
    next_id: i64,
    records: HashMap<i64, PositionRecord>,
}

#[derive(Default)]
pub struct InMemoryPositionStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, open and closed, ordered by id.
    pub async fn records(&self) -> Vec<PositionRecord> {
        let inner = self.inner.read().await;
        let mut records: Vec<PositionRecord> = inner.records.values().cloned().collect();
        records.sort_by_key(|r| r.id);
        records
    }
}

#[async_trait]
impl PositionStore for InMemoryPositionStore {
    async fn record_open(&self, position: &Position) -> Result<i64, BotError> {
        let mut inner = self.inner.write().await;
        if inner
            .records
            .values()
            .any(|r| r.is_open() && r.position.symbol == position.symbol)
        {
            return Err(BotError::PositionError {
                reason: format!("{} already has an open record", position.symbol),
            });
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.records.insert(
            id,
            PositionRecord {
                id,
                position: position.clone(),
                closed_at: None,
                exit_price: None,
                close_reason: None,
            },
        );
        Ok(id)
    }

    async fn find_open(&self, symbol: &str) -> Result<Option<PositionRecord>, BotError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .values()
            .find(|r| r.is_open() && r.position.symbol == symbol)
            .cloned())
    }

    async fn record_close(
        &self,
        id: i64,
        exit_price: Decimal,
        reason: &str,
        closed_at: i64,
    ) -> Result<(), BotError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .get_mut(&id)
            .filter(|r| r.is_open())
            .ok_or_else(|| BotError::PositionError {
                reason: format!("no open record with id {id}"),
            })?;
        record.closed_at = Some(closed_at);
        record.exit_price = Some(exit_price);
        record.close_reason = Some(reason.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PositionDirection;
    use rust_decimal_macros::dec;

    fn position(symbol: &str) -> Position {
        Position {
            symbol: symbol.into(),
            side: PositionDirection::Short,
            size: dec!(1),
            entry_price: dec!(50),
            current_price: dec!(50),
            leverage: dec!(2),
            stop_loss: None,
            take_profit: None,
            opened_at: 10,
        }
    }

    #[tokio::test]
    async fn test_open_find_close_lifecycle() {
        let store = InMemoryPositionStore::new();
        let id = store.record_open(&position("SOLUSDT")).await.unwrap();

        let open = store.find_open("SOLUSDT").await.unwrap().unwrap();
        assert_eq!(open.id, id);

        store.record_close(id, dec!(48), "take profit", 20).await.unwrap();
        assert!(store.find_open("SOLUSDT").await.unwrap().is_none());

        let records = store.records().await;
        assert_eq!(records[0].exit_price, Some(dec!(48)));
        assert_eq!(records[0].close_reason.as_deref(), Some("take profit"));
    }

    #[tokio::test]
    async fn test_second_open_record_rejected() {
        let store = InMemoryPositionStore::new();
        store.record_open(&position("SOLUSDT")).await.unwrap();
        assert!(store.record_open(&position("SOLUSDT")).await.is_err());
    }

    #[tokio::test]
    async fn test_double_close_rejected() {
        let store = InMemoryPositionStore::new();
        let id = store.record_open(&position("SOLUSDT")).await.unwrap();
        store.record_close(id, dec!(50), "manual", 11).await.unwrap();
        assert!(store.record_close(id, dec!(50), "manual", 12).await.is_err());
    }
}
