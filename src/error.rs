use crate::ai::client::AiClientError;
use crate::store::StoreError;

/// Domain-level failure classes surfaced by the mapping and query services.
///
/// Handler code maps these onto HTTP statuses: `NotFound` -> 404,
/// `Validation` and `QueryExecution` -> 400, everything else -> 500.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },

    #[error("{0}")]
    Validation(String),

    /// Hosted language model unreachable or returned garbage. The mapping
    /// resolver never lets this escape (it degrades to a zero-confidence
    /// result); the analytics query service reports it to the caller.
    #[error("language model request failed: {0}")]
    ExternalService(#[from] AiClientError),

    /// Generated SQL was rejected by the shape validator or failed to run.
    #[error("SQL error: {0}")]
    QueryExecution(String),

    #[error(transparent)]
    Storage(StoreError),
}

impl DomainError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            // User-supplied SQL failing is a client problem, not an outage.
            StoreError::Query(message) => Self::QueryExecution(message),
            other => Self::Storage(other),
        }
    }
}
