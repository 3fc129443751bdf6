//! Classifier error types

use std::time::Duration;
use thiserror::Error;

/// Errors from the external classification service
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Could not extract a {0} from the message")]
    NoExtraction(&'static str),
}

/// HTTP status codes worth retrying
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504 | 529)
}

impl ClassifierError {
    /// Whether the call may be retried. The HTTP client's backoff loop
    /// consults this; everything non-retryable falls straight through to
    /// the deterministic rules.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClassifierError::RateLimited { .. } => true,
            ClassifierError::ApiError { status, .. } => is_retryable_status(*status),
            ClassifierError::Network(_) => true,
            ClassifierError::Timeout(_) => true,
            ClassifierError::InvalidResponse(_) => false,
            ClassifierError::NoExtraction(_) => false,
        }
    }
}
