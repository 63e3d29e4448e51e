pub mod error;
pub mod time_value;
pub mod types;

pub mod assumptions;
pub mod costs;
pub mod debt;
pub mod energy;
pub mod metrics;
pub mod model;
pub mod revenue;
pub mod tax;
pub mod timeline;
pub mod waterfall;

#[cfg(feature = "scenarios")]
pub mod scenarios;

pub use error::SolarFinanceError;
pub use model::{run_model, SolarModelOutput};
pub use types::*;

/// Standard result type for all solar-finance operations
pub type SolarFinanceResult<T> = Result<T, SolarFinanceError>;
