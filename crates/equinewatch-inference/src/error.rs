//! Error types for the external inference primitives (§6, §7 `InferenceError`).

use thiserror::Error;

pub type InferenceResult<T> = Result<T, InferenceError>;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Inference service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Empty crop: cannot compute embedding")]
    EmptyCrop,
}

impl InferenceError {
    /// §7 `InferenceError`: the caller (tracker) treats this as "no result
    /// for this frame/box", not a fatal chunk failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InferenceError::ServiceUnavailable(_) | InferenceError::Timeout(_) | InferenceError::Network(_)
        )
    }
}
