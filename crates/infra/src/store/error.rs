use thiserror::Error;

use stockflow_core::DomainError;

/// Store-level error.
///
/// Business refusals pass through as [`StoreError::Domain`]. Infrastructure
/// failures stay separate so they are never reported as a business error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Serialization failure or deadlock; nothing was written, safe to retry.
    #[error("transient store failure: {0}")]
    Transient(String),

    /// Store unreachable or otherwise broken.
    #[error("store failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    pub(crate) fn poisoned() -> Self {
        StoreError::Backend("lock poisoned".to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
