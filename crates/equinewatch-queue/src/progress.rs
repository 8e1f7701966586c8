//! Progress events via Redis Pub/Sub with persistence and heartbeat support (§4.8).
//!
//! This module provides:
//! - Real-time `PublishProgress`/`PublishTerminal` events via Redis Pub/Sub
//! - Persistent progress history via Redis Sorted Sets
//! - Worker heartbeat tracking for stale job detection
//! - Job status caching for fast polling

use chrono::Utc;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use equinewatch_models::{JobId, JobStatus, JobStatusCache};

use crate::error::QueueResult;

const HEARTBEAT_KEY_PREFIX: &str = "heartbeat:";
const PROGRESS_HISTORY_PREFIX: &str = "progress:history:";
const JOB_STATUS_PREFIX: &str = "job:status:";
const ACTIVE_JOBS_KEY: &str = "jobs:active";

/// Heartbeat TTL - job considered dead after this duration without heartbeat (seconds).
pub const HEARTBEAT_TTL_SECS: u64 = 60;

/// Progress history TTL - keep progress events for recovery (seconds).
pub const PROGRESS_HISTORY_TTL_SECS: u64 = 3600;

/// Job status cache TTL (seconds).
pub const JOB_STATUS_TTL_SECS: u64 = 86400;

/// Grace period before marking a job without heartbeat as stale (seconds), §5.
pub const STALE_GRACE_PERIOD_SECS: i64 = 120;

/// Stale threshold - no heartbeat for this long means stale (seconds), §5.
pub const STALE_THRESHOLD_SECS: i64 = 60;

/// `PublishProgress`/`PublishTerminal` payload (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressMessage {
    /// `PublishProgress(job_id, percent, step_label)`.
    Progress { percent: u8, step_label: String },
    /// `PublishTerminal(job_id, {completed|failed, error?})`.
    Terminal { status: JobStatus, error: Option<String> },
}

/// Progress event published to Redis, addressed to one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub message: ProgressMessage,
    #[serde(default = "default_timestamp")]
    pub timestamp_ms: i64,
    #[serde(default)]
    pub seq: u64,
}

fn default_timestamp() -> i64 {
    Utc::now().timestamp_millis()
}

impl ProgressEvent {
    pub fn new(job_id: JobId, message: ProgressMessage) -> Self {
        Self { job_id, message, timestamp_ms: Utc::now().timestamp_millis(), seq: 0 }
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }
}

/// Channel for publishing/subscribing to progress events.
#[derive(Clone)]
pub struct ProgressChannel {
    client: redis::Client,
}

impl ProgressChannel {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub fn channel_name(job_id: &JobId) -> String {
        format!("progress:{}", job_id)
    }

    /// Publish a progress event (Pub/Sub only, no persistence).
    pub async fn publish(&self, event: &ProgressEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(&event.job_id);
        let payload = serde_json::to_string(event)?;

        debug!("publishing progress event to {}", channel);
        conn.publish::<_, _, ()>(channel, payload).await?;

        Ok(())
    }

    /// Publish a progress event with persistence to history (dual-write:
    /// Pub/Sub for live delivery, sorted set scored by timestamp for recovery).
    pub async fn publish_with_history(&self, event: &ProgressEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(&event.job_id);
        let history_key = format!("{}{}", PROGRESS_HISTORY_PREFIX, event.job_id);
        let payload = serde_json::to_string(event)?;
        let score = event.timestamp_ms as f64;

        redis::pipe()
            .publish(&channel, &payload)
            .ignore()
            .zadd(&history_key, &payload, score)
            .ignore()
            .expire(&history_key, PROGRESS_HISTORY_TTL_SECS as i64)
            .ignore()
            .exec_async(&mut conn)
            .await?;

        Ok(())
    }

    /// `PublishProgress(job_id, percent, step_label)` (§4.8).
    pub async fn publish_progress(&self, job_id: &JobId, percent: u8, step_label: impl Into<String>) -> QueueResult<()> {
        self.publish_with_history(&ProgressEvent::new(
            job_id.clone(),
            ProgressMessage::Progress { percent: percent.min(100), step_label: step_label.into() },
        ))
        .await
    }

    /// `PublishTerminal(job_id, {completed|failed, error?})` (§4.8).
    pub async fn publish_terminal(&self, job_id: &JobId, status: JobStatus, error: Option<String>) -> QueueResult<()> {
        self.publish_with_history(&ProgressEvent::new(job_id.clone(), ProgressMessage::Terminal { status, error }))
            .await
    }

    /// Subscribe to progress events for a job. Returns a pinned stream.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = ProgressEvent> + Send>>> {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = Self::channel_name(job_id);

        pubsub.subscribe(&channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }

    // ========================================================================
    // Heartbeat
    // ========================================================================

    /// Update worker heartbeat for a job. Workers call this periodically while
    /// processing; missing it for `HEARTBEAT_TTL_SECS` marks the job stale (§5).
    pub async fn heartbeat(&self, job_id: &JobId) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("{}{}", HEARTBEAT_KEY_PREFIX, job_id);
        let now = Utc::now().timestamp();

        conn.set_ex::<_, _, ()>(&key, now, HEARTBEAT_TTL_SECS).await?;
        debug!("updated heartbeat for job {}", job_id);

        Ok(())
    }

    pub async fn is_alive(&self, job_id: &JobId) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("{}{}", HEARTBEAT_KEY_PREFIX, job_id);
        let exists: bool = conn.exists(&key).await?;
        Ok(exists)
    }

    pub async fn get_last_heartbeat(&self, job_id: &JobId) -> QueueResult<Option<i64>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("{}{}", HEARTBEAT_KEY_PREFIX, job_id);
        let timestamp: Option<i64> = conn.get(&key).await?;
        Ok(timestamp)
    }

    pub async fn clear_heartbeat(&self, job_id: &JobId) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("{}{}", HEARTBEAT_KEY_PREFIX, job_id);
        conn.del::<_, ()>(&key).await?;
        Ok(())
    }

    // ========================================================================
    // Progress history
    // ========================================================================

    pub async fn get_history_since(&self, job_id: &JobId, since_ms: i64) -> QueueResult<Vec<ProgressEvent>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("{}{}", PROGRESS_HISTORY_PREFIX, job_id);

        let events: Vec<String> = conn.zrangebyscore(&key, since_ms as f64, "+inf").await?;

        let parsed: Vec<ProgressEvent> =
            events.into_iter().filter_map(|s| serde_json::from_str(&s).ok()).collect();

        Ok(parsed)
    }

    pub async fn get_full_history(&self, job_id: &JobId) -> QueueResult<Vec<ProgressEvent>> {
        self.get_history_since(job_id, 0).await
    }

    pub async fn get_history_count(&self, job_id: &JobId) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("{}{}", PROGRESS_HISTORY_PREFIX, job_id);
        let count: u64 = conn.zcard(&key).await?;
        Ok(count)
    }

    pub async fn clear_history(&self, job_id: &JobId) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("{}{}", PROGRESS_HISTORY_PREFIX, job_id);
        conn.del::<_, ()>(&key).await?;
        Ok(())
    }

    // ========================================================================
    // Job status cache
    // ========================================================================

    pub async fn init_job_status(&self, job_id: &JobId, chunk_id: &str, stream_id: &str) -> QueueResult<()> {
        let status = JobStatusCache::new(job_id.to_string(), chunk_id, stream_id);
        self.update_job_status(job_id, &status).await?;
        self.add_to_active_jobs(job_id).await?;
        Ok(())
    }

    pub async fn update_job_status(&self, job_id: &JobId, status: &JobStatusCache) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("{}{}", JOB_STATUS_PREFIX, job_id);
        let payload = serde_json::to_string(status)?;

        conn.set_ex::<_, _, ()>(&key, payload, JOB_STATUS_TTL_SECS).await?;
        Ok(())
    }

    pub async fn get_job_status(&self, job_id: &JobId) -> QueueResult<Option<JobStatusCache>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("{}{}", JOB_STATUS_PREFIX, job_id);

        let value: Option<String> = conn.get(&key).await?;
        Ok(value.and_then(|s| serde_json::from_str(&s).ok()))
    }

    pub async fn update_job_progress(&self, job_id: &JobId, progress: u8, step_label: &str) -> QueueResult<()> {
        if let Some(mut status) = self.get_job_status(job_id).await? {
            status.set_progress(progress, step_label);
            self.update_job_status(job_id, &status).await?;
        }
        Ok(())
    }

    pub async fn complete_job_status(&self, job_id: &JobId) -> QueueResult<()> {
        if let Some(mut status) = self.get_job_status(job_id).await? {
            status.complete();
            self.update_job_status(job_id, &status).await?;
            self.remove_from_active_jobs(job_id).await?;
            self.clear_heartbeat(job_id).await?;
        }
        Ok(())
    }

    pub async fn fail_job_status(&self, job_id: &JobId, error: &str) -> QueueResult<()> {
        if let Some(mut status) = self.get_job_status(job_id).await? {
            status.fail(error);
            self.update_job_status(job_id, &status).await?;
            self.remove_from_active_jobs(job_id).await?;
            self.clear_heartbeat(job_id).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Active jobs tracking
    // ========================================================================

    async fn add_to_active_jobs(&self, job_id: &JobId) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let score = Utc::now().timestamp_millis() as f64;
        conn.zadd::<_, _, _, ()>(ACTIVE_JOBS_KEY, job_id.to_string(), score).await?;
        Ok(())
    }

    async fn remove_from_active_jobs(&self, job_id: &JobId) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.zrem::<_, _, ()>(ACTIVE_JOBS_KEY, job_id.to_string()).await?;
        Ok(())
    }

    pub async fn remove_from_active_jobs_by_id(&self, job_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.zrem::<_, _, ()>(ACTIVE_JOBS_KEY, job_id).await?;
        Ok(())
    }

    /// All active jobs, used by the stale job detector (§5).
    pub async fn get_active_jobs(&self) -> QueueResult<Vec<JobStatusCache>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let job_ids: Vec<String> = conn.zrange(ACTIVE_JOBS_KEY, 0, -1).await?;

        let mut statuses = Vec::with_capacity(job_ids.len());
        for job_id in job_ids {
            if let Some(status) = self.get_job_status(&JobId::from_string(job_id)).await? {
                statuses.push(status);
            }
        }

        Ok(statuses)
    }

    pub async fn get_active_job_count(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let count: u64 = conn.zcard(ACTIVE_JOBS_KEY).await?;
        Ok(count)
    }

    /// Remove active-job entries with no matching status cache.
    pub async fn cleanup_active_jobs(&self) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let job_ids: Vec<String> = conn.zrange(ACTIVE_JOBS_KEY, 0, -1).await?;

        let mut removed = 0u32;
        for job_id in job_ids {
            let key = format!("{}{}", JOB_STATUS_PREFIX, job_id);
            let exists: bool = conn.exists(&key).await?;
            if !exists {
                conn.zrem::<_, _, ()>(ACTIVE_JOBS_KEY, &job_id).await?;
                removed += 1;
                warn!("cleaned up orphaned active job: {}", job_id);
            }
        }

        Ok(removed)
    }
}
