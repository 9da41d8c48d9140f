use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskEngineError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {context} ({available} observations available, {required} required)")]
    InsufficientData {
        context: String,
        required: usize,
        available: usize,
    },

    #[error("Unknown symbol: no price history for '{0}'")]
    UnknownSymbol(String),

    #[error("Covariance matrix ({dimension}x{dimension}) is not positive definite: pivot {pivot} is non-positive (regularized: {regularized})")]
    NonPositiveDefiniteCovariance {
        dimension: usize,
        pivot: usize,
        regularized: bool,
    },

    #[error("Degenerate portfolio weights: {0}")]
    DegenerateWeights(String),

    #[error("Calculation timed out after {elapsed_ms} ms (limit {limit_ms} ms)")]
    Timeout { elapsed_ms: u64, limit_ms: u64 },

    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RiskEngineError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        RiskEngineError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn insufficient(context: impl Into<String>, required: usize, available: usize) -> Self {
        RiskEngineError::InsufficientData {
            context: context.into(),
            required,
            available,
        }
    }
}

impl From<serde_json::Error> for RiskEngineError {
    fn from(e: serde_json::Error) -> Self {
        RiskEngineError::Serialization(e.to_string())
    }
}
