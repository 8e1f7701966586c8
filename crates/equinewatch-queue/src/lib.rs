//! Redis Streams job queue for the scheduler collaborator interface (§4.8).
//!
//! This crate provides:
//! - Job submission via Redis Streams, with at-most-one-in-flight per `chunk_id`
//! - Worker consumption with retry, orphaned-job reclamation, and DLQ
//! - `PublishProgress`/`PublishTerminal` events via Redis Pub/Sub

pub mod error;
pub mod progress;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use progress::{
    ProgressChannel, ProgressEvent, ProgressMessage, HEARTBEAT_TTL_SECS, JOB_STATUS_TTL_SECS,
    PROGRESS_HISTORY_TTL_SECS, STALE_GRACE_PERIOD_SECS, STALE_THRESHOLD_SECS,
};
pub use queue::{JobQueue, QueueConfig};
