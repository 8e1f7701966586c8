//! Job definitions for the chunk-processing queue (§4.8, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::correction::Correction;
use crate::ids::{BarnId, ChunkId, StreamId};

/// Unique identifier for a queued job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job state in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    DeadLettered,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::DeadLettered => "dead_lettered",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::DeadLettered)
    }
}

/// Per-chunk processing options (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingOptions {
    pub detection_threshold: f32,
    pub keypoint_threshold: f32,
    pub appearance_threshold: f32,
    pub max_lost_frames: u32,
    pub revive_window_s: f64,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            detection_threshold: crate::detection::DEFAULT_DETECTION_THRESHOLD,
            keypoint_threshold: crate::keypoints::DEFAULT_KEYPOINT_THRESHOLD,
            appearance_threshold: 0.7,
            max_lost_frames: 30,
            revive_window_s: 10.0,
        }
    }
}

/// Job payload variants (§4.8, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// `Submit(job)`: process a chunk end-to-end.
    ProcessChunk {
        chunk_path: String,
        output_video_path: String,
        output_json_path: String,
        start_time: f64,
        frame_interval: u32,
        options: ProcessingOptions,
    },
    /// A reprocessing request (§6): `{chunk_id, corrections}`.
    ReprocessChunk { corrections: Vec<Correction> },
}

/// A job to be processed by the worker (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub chunk_id: ChunkId,
    pub stream_id: StreamId,
    pub barn_id: BarnId,
    pub kind: JobKind,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    pub progress: u8,
    /// Enforces at-most-one-in-flight per `chunk_id` (§4.8, §5).
    pub idempotency_key: String,
}

fn default_max_retries() -> u32 {
    3
}

impl Job {
    pub fn new_process_chunk(
        chunk_id: ChunkId,
        stream_id: StreamId,
        barn_id: BarnId,
        chunk_path: impl Into<String>,
        output_video_path: impl Into<String>,
        output_json_path: impl Into<String>,
        frame_interval: u32,
        options: ProcessingOptions,
    ) -> Self {
        let now = Utc::now();
        let idempotency_key = format!("process:{}", chunk_id);
        Self {
            id: JobId::new(),
            chunk_id,
            stream_id,
            barn_id,
            kind: JobKind::ProcessChunk {
                chunk_path: chunk_path.into(),
                output_video_path: output_video_path.into(),
                output_json_path: output_json_path.into(),
                start_time: 0.0,
                frame_interval,
                options,
            },
            state: JobState::Pending,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: default_max_retries(),
            error_message: None,
            progress: 0,
            idempotency_key,
        }
    }

    pub fn new_reprocess_chunk(
        chunk_id: ChunkId,
        stream_id: StreamId,
        barn_id: BarnId,
        corrections: Vec<Correction>,
    ) -> Self {
        let now = Utc::now();
        let idempotency_key = format!("reprocess:{}", chunk_id);
        Self {
            id: JobId::new(),
            chunk_id,
            stream_id,
            barn_id,
            kind: JobKind::ReprocessChunk { corrections },
            state: JobState::Pending,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: default_max_retries(),
            error_message: None,
            progress: 0,
            idempotency_key,
        }
    }

    pub fn start(mut self) -> Self {
        self.state = JobState::Processing;
        self.started_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    pub fn complete(mut self) -> Self {
        self.state = JobState::Completed;
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self.progress = 100;
        self
    }

    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.state = JobState::Failed;
        self.error_message = Some(error.into());
        self.updated_at = Utc::now();
        self.retry_count += 1;
        self
    }

    pub fn dead_letter(mut self) -> Self {
        self.state = JobState::DeadLettered;
        self.updated_at = Utc::now();
        self
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries && self.state == JobState::Failed
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress.min(100);
        self.updated_at = Utc::now();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (ChunkId, StreamId, BarnId) {
        (ChunkId::new("chunk-1"), StreamId::new("stream-1"), BarnId::new("barn-1"))
    }

    #[test]
    fn process_chunk_job_has_stable_idempotency_key() {
        let (chunk_id, stream_id, barn_id) = ids();
        let job = Job::new_process_chunk(
            chunk_id,
            stream_id,
            barn_id,
            "/in.mp4",
            "/out.mp4",
            "/out.json",
            1,
            ProcessingOptions::default(),
        );
        assert_eq!(job.idempotency_key, "process:chunk-1");
        assert_eq!(job.state, JobState::Pending);
    }

    #[test]
    fn job_state_transitions() {
        let (chunk_id, stream_id, barn_id) = ids();
        let job = Job::new_process_chunk(
            chunk_id,
            stream_id,
            barn_id,
            "/in.mp4",
            "/out.mp4",
            "/out.json",
            1,
            ProcessingOptions::default(),
        );
        let started = job.start();
        assert_eq!(started.state, JobState::Processing);
        let completed = started.complete();
        assert_eq!(completed.state, JobState::Completed);
        assert_eq!(completed.progress, 100);
    }

    #[test]
    fn failed_job_can_retry_until_max() {
        let (chunk_id, stream_id, barn_id) = ids();
        let job = Job::new_process_chunk(
            chunk_id,
            stream_id,
            barn_id,
            "/in.mp4",
            "/out.mp4",
            "/out.json",
            1,
            ProcessingOptions::default(),
        );
        let failed = job.fail("boom");
        assert!(failed.can_retry());
        assert_eq!(failed.retry_count, 1);
    }
}
