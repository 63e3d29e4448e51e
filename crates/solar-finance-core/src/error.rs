use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SolarFinanceError {
    /// Structurally invalid or out-of-domain input (e.g. horizon <= 0, a
    /// fraction outside [0, 1]).
    #[error("Configuration error: {field} — {reason}")]
    Configuration { field: String, reason: String },

    /// A violated accounting invariant (e.g. MACRS table not summing to 1,
    /// negative depreciable basis).
    #[error("Domain error: {0}")]
    Domain(String),

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    Convergence {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SolarFinanceError {
    pub(crate) fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SolarFinanceError::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for SolarFinanceError {
    fn from(e: serde_json::Error) -> Self {
        SolarFinanceError::Serialization(e.to_string())
    }
}
