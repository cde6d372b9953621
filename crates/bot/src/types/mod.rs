pub mod audit;
pub mod market_data;
pub mod position;
pub mod signal;

pub use audit::*;
pub use market_data::*;
pub use position::*;
pub use signal::*;
