//! Exchange execution collaborator.
//!
//! The core only calls through this trait; order routing, signing and venue
//! specifics live in the implementation.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::errors::BotError;
use crate::types::{OpenOrder, Position};

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Open a position and return it as filled.
    async fn open(&self, order: &OpenOrder) -> Result<Position, BotError>;

    /// Close the whole position on `symbol`, returning the exit price.
    async fn close(&self, symbol: &str) -> Result<Decimal, BotError>;

    /// Authoritative exposure on `symbol`, if any.
    async fn get_position(&self, symbol: &str) -> Result<Option<Position>, BotError>;
}
