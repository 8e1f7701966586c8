//! Error types for the identity registry (hot + warm tiers).

use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur against the hot (Redis) or warm (Firestore-style) tiers.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Rate limited, retry after {0}ms")]
    RateLimited(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Hot-tier error: {0}")]
    Hot(#[from] redis::RedisError),

    #[error("Corrupt registry entry {id}: {reason}")]
    CorruptEntry { id: String, reason: String },
}

impl RegistryError {
    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::AuthError(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn corrupt_entry(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptEntry { id: id.into(), reason: reason.into() }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RegistryError::Network(_) | RegistryError::RateLimited(_) | RegistryError::Hot(_)
        )
    }

    /// True if the error was caused by a failed precondition (e.g., updateTime mismatch).
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, RegistryError::PreconditionFailed(_))
            || matches!(
                self,
                RegistryError::RequestFailed(msg)
                if msg.contains("FAILED_PRECONDITION") || msg.contains("Precondition")
            )
    }

    /// Delay to honor before retrying, if the error carries one (e.g. a
    /// rate-limit response with an explicit `Retry-After`).
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            RegistryError::RateLimited(ms) => Some(*ms),
            _ => None,
        }
    }
}
