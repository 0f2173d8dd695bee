pub mod cash_flows;
pub mod classification;
pub mod config;
pub mod data;
pub mod error;
pub mod time_value;
pub mod types;

#[cfg(feature = "performance")]
pub mod performance;

pub use error::{NoSolution, PortfolioError};
pub use types::*;

/// Standard result type for all portfolio-irr operations
pub type PortfolioResult<T> = Result<T, PortfolioError>;
