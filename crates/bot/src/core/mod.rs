pub mod breakout;
pub mod conditions;
pub mod data_service;
pub mod fusion;
pub mod gate;
pub mod indicators;
pub mod pipeline;
pub mod position_cache;
pub mod position_manager;
pub mod position_store;
pub mod risk_review;
pub mod safety;
pub mod signal_engine;
pub mod trend;
pub mod volume_profile;
