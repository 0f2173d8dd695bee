use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Data integrity: {table} has no usable entry for '{identifier}' — {reason}")]
    DataIntegrity {
        table: String,
        identifier: String,
        reason: String,
    },

    #[error("Missing column '{column}' in {table}")]
    MissingColumn { table: String, column: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for PortfolioError {
    fn from(e: serde_json::Error) -> Self {
        PortfolioError::SerializationError(e.to_string())
    }
}

/// Why the XIRR solver could not produce a rate.
///
/// This is an expected outcome, not a failure of the surrounding analysis:
/// the metrics engine reports it as an undefined IRR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NoSolution {
    #[error("at least 2 cash flows are required")]
    InsufficientFlows,

    #[error("cash flows are all the same sign")]
    UniformSign,

    #[error("rate left the domain where (1 + r)^t is defined")]
    NumericDomain,

    #[error("did not converge after {iterations} iterations")]
    NonConvergence { iterations: u32 },

    #[error("no sign change of NPV between {lower} and {upper}")]
    NoBracket {
        lower: rust_decimal::Decimal,
        upper: rust_decimal::Decimal,
    },
}
