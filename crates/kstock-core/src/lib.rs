pub mod capm;
pub mod error;
pub mod holdings;
mod math;
pub mod providers;
pub mod returns;
pub mod time_series;
pub mod types;

#[cfg(feature = "portfolio_optimization")]
pub mod portfolio_optimization;

#[cfg(feature = "performance")]
pub mod performance;

#[cfg(feature = "workflows")]
pub mod workflows;

pub use error::KStockError;
pub use types::*;

/// Standard result type for all kstock operations
pub type KStockResult<T> = Result<T, KStockError>;
