pub mod exchange;
pub mod paper_exchange;
pub mod review_client;

use std::sync::Arc;

pub use exchange::ExchangeClient;
pub use paper_exchange::PaperExchange;
pub use review_client::HttpRiskOracle;

use crate::config::PositionConfig;
use crate::errors::BotError;

/// Paper exchange for dry-run mode. Live venues are supplied by the
/// embedding application, so live mode is a configuration error here.
pub fn paper_exchange(config: &PositionConfig) -> Result<Arc<PaperExchange>, BotError> {
    if !config.dry_run {
        return Err(BotError::Config(
            "positions.dry_run is false: a live ExchangeClient must be provided".into(),
        ));
    }
    Ok(Arc::new(PaperExchange::new(config.paper_slippage_bps)))
}
