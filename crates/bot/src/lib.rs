//! Volume-profile edge breakout scoring, regime gating, risk review and
//! position guarding for crypto perpetual futures.

pub mod config;
pub mod constants;
pub mod core;
pub mod errors;
pub mod execution;
pub mod logging;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;
