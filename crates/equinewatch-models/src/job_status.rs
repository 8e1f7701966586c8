//! Job status cache for progress tracking and polling (§4.8, §6).
//!
//! This module provides types for caching job status in the hot tier,
//! enabling fast polling queries and stale-job detection without reading
//! back the persisted `ChunkRecord`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cached job status for fast polling queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusCache {
    pub job_id: String,
    pub chunk_id: String,
    pub stream_id: String,
    pub status: JobStatus,
    /// Progress percentage (0-100).
    pub progress: u8,
    pub frames_processed: u64,
    pub frames_total: u64,
    /// Current processing step label (§4.8 `PublishProgress` step_label).
    pub current_step: Option<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Sequence number for event ordering (monotonically increasing).
    pub event_seq: u64,
}

/// Job processing status, matching the `{status ∈ {pending,running,completed,failed}}`
/// contract of §6's reprocessing status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    /// Worker stopped responding (stale).
    Stale,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Stale => "stale",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl JobStatusCache {
    pub fn new(job_id: impl Into<String>, chunk_id: impl Into<String>, stream_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            chunk_id: chunk_id.into(),
            stream_id: stream_id.into(),
            status: JobStatus::Pending,
            progress: 0,
            frames_processed: 0,
            frames_total: 0,
            current_step: None,
            error_message: None,
            started_at: now,
            updated_at: now,
            last_heartbeat: None,
            event_seq: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn set_status(&mut self, status: JobStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn set_progress(&mut self, progress: u8, step: impl Into<String>) {
        self.progress = progress.min(100);
        self.current_step = Some(step.into());
        self.updated_at = Utc::now();
        self.event_seq += 1;
    }

    pub fn record_heartbeat(&mut self) {
        self.last_heartbeat = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.current_step = Some("complete".into());
        self.updated_at = Utc::now();
        self.event_seq += 1;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(error.into());
        self.updated_at = Utc::now();
        self.event_seq += 1;
    }

    pub fn mark_stale(&mut self) {
        self.status = JobStatus::Stale;
        self.error_message = Some("Processing timed out. The worker may have crashed.".into());
        self.updated_at = Utc::now();
        self.event_seq += 1;
    }

    /// A job is stale if not terminal and either no heartbeat has arrived
    /// within the grace period, or the last heartbeat is too old.
    pub fn is_stale(&self, stale_threshold_secs: i64, grace_period_secs: i64) -> bool {
        if self.is_terminal() {
            return false;
        }

        let now = Utc::now();
        match self.last_heartbeat {
            Some(hb) => (now - hb).num_seconds() > stale_threshold_secs,
            None => (now - self.started_at).num_seconds() > grace_period_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_cache_creation() {
        let cache = JobStatusCache::new("job-1", "chunk-1", "stream-1");
        assert_eq!(cache.status, JobStatus::Pending);
        assert_eq!(cache.progress, 0);
        assert!(!cache.is_terminal());
    }

    #[test]
    fn job_status_transitions() {
        let mut cache = JobStatusCache::new("job-1", "chunk-1", "stream-1");

        cache.set_status(JobStatus::Running);
        assert_eq!(cache.status, JobStatus::Running);
        assert!(!cache.is_terminal());

        cache.set_progress(50, "tracking");
        assert_eq!(cache.progress, 50);

        cache.complete();
        assert_eq!(cache.status, JobStatus::Completed);
        assert_eq!(cache.progress, 100);
        assert!(cache.is_terminal());
    }

    #[test]
    fn job_status_stale_detection() {
        let mut cache = JobStatusCache::new("job-1", "chunk-1", "stream-1");
        cache.set_status(JobStatus::Running);

        assert!(!cache.is_stale(60, 120));

        cache.started_at = Utc::now() - chrono::Duration::seconds(200);
        assert!(cache.is_stale(60, 120));

        cache.record_heartbeat();
        assert!(!cache.is_stale(60, 120));
    }
}
