use thiserror::Error;

#[derive(Debug, Error)]
pub enum KStockError {
    #[error("Insufficient data: {0}")]
    DataInsufficiency(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Optimization failure: {reason} (after {iterations} iterations)")]
    Optimization { reason: String, iterations: u32 },

    #[error("Allocation failure for {asset}: {reason}")]
    Allocation { asset: String, reason: String },

    #[error("Upstream fetch failed: {source_id} ({context}) — {message}")]
    UpstreamFetch {
        source_id: String,
        context: String,
        message: String,
    },

    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl KStockError {
    /// Shorthand for a provider failure on one symbol/date range.
    pub fn upstream(
        source_id: impl Into<String>,
        context: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        KStockError::UpstreamFetch {
            source_id: source_id.into(),
            context: context.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for KStockError {
    fn from(e: serde_json::Error) -> Self {
        KStockError::SerializationError(e.to_string())
    }
}
