//! Worker error kinds (§7).

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// The §7 error kinds, plus the wrapped collaborator errors that produce
/// them. Propagation policy is enforced at the point each is handled in
/// [`crate::pipeline`] and [`crate::reprocessor`]: input, timeout, capacity,
/// and cancellation errors surface to the scheduler; decode and inference
/// errors are recovered per-frame; registry errors degrade the scope.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Chunk file or prior JSON missing. Surfaced to caller; job failed.
    #[error("input not found: {0}")]
    InputNotFound(String),

    /// Frame read failed mid-stream. Remaining frames are marked
    /// `processed=false`; the chunk still completes with partial output.
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Submission queue full. Returned to the caller; no state change.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Job exceeded its budget. Partial outputs are removed.
    #[error("job timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A correction addresses a slot that doesn't exist or omits a field
    /// its type requires. The whole batch is rejected, none applied.
    #[error("invalid correction: {0}")]
    CorrectionInvalid(String),

    /// Explicit cancellation. Partial outputs are removed.
    #[error("job cancelled")]
    Cancelled,

    #[error("media error: {0}")]
    Media(#[from] equinewatch_media::MediaError),

    #[error("storage error: {0}")]
    Storage(#[from] equinewatch_storage::StorageError),

    #[error("registry error: {0}")]
    Registry(#[from] equinewatch_registry::RegistryError),

    #[error("inference error: {0}")]
    Inference(#[from] equinewatch_inference::InferenceError),

    #[error("queue error: {0}")]
    Queue(#[from] equinewatch_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn input_not_found(msg: impl Into<String>) -> Self {
        Self::InputNotFound(msg.into())
    }

    pub fn decode_error(msg: impl Into<String>) -> Self {
        Self::DecodeError(msg.into())
    }

    pub fn correction_invalid(msg: impl Into<String>) -> Self {
        Self::CorrectionInvalid(msg.into())
    }

    pub fn timeout(budget: std::time::Duration) -> Self {
        Self::Timeout(budget)
    }

    pub fn cancelled() -> Self {
        Self::Cancelled
    }

    /// Whether the executor should let this job redeliver/retry, versus
    /// dead-lettering it immediately. Transient collaborator failures are
    /// retryable; everything that reached this layer as a terminal §7 kind
    /// already represents a decision the pipeline made not to retry itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkerError::Storage(_) | WorkerError::Registry(_) | WorkerError::Queue(_))
    }

    /// §7: `Timeout` and `Cancelled` jobs have their partial outputs
    /// removed, unlike `DecodeError`'s partial-completion path.
    pub fn discards_partial_output(&self) -> bool {
        matches!(self, WorkerError::Timeout(_) | WorkerError::Cancelled)
    }
}
