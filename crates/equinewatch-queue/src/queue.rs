//! Job queue using Redis Streams (§4.8 scheduler collaborator interface).

use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use equinewatch_models::Job;

use crate::error::{QueueError, QueueResult};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub redis_url: String,
    pub stream_name: String,
    pub consumer_group: String,
    pub dlq_stream_name: String,
    pub max_retries: u32,
    /// `job_timeout_s` (§5, default 300s): also used as the Redis Streams
    /// visibility timeout for `claim_pending`.
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "equinewatch:jobs".to_string(),
            consumer_group: "equinewatch:workers".to_string(),
            dlq_stream_name: "equinewatch:dlq".to_string(),
            max_retries: 3,
            visibility_timeout: Duration::from_secs(300),
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or_else(|_| "equinewatch:jobs".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "equinewatch:workers".to_string()),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or_else(|_| "equinewatch:dlq".to_string()),
            max_retries: std::env::var("QUEUE_MAX_RETRIES").ok().and_then(|s| s.parse().ok()).unwrap_or(3),
            visibility_timeout: Duration::from_secs(
                std::env::var("QUEUE_VISIBILITY_TIMEOUT").ok().and_then(|s| s.parse().ok()).unwrap_or(300),
            ),
        }
    }
}

/// Job queue client: Redis Streams consumer group with dedup, retry, and DLQ.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// Create the consumer group if it does not already exist.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// `Submit(job) → accepted immediately, returns job_id` (§4.8).
    ///
    /// The scheduler guarantees at-most-one in-flight job per `chunk_id`
    /// (§4.8, §5): a duplicate `idempotency_key` is rejected, not queued twice.
    pub async fn submit(&self, job: &Job) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(job)?;
        let idempotency_key = &job.idempotency_key;

        let dedup_key = format!("equinewatch:dedup:{}", idempotency_key);
        let exists: bool = conn.exists(&dedup_key).await?;
        if exists {
            warn!("duplicate job rejected: {}", idempotency_key);
            return Err(QueueError::enqueue_failed("duplicate job for this chunk_id"));
        }

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(idempotency_key)
            .query_async(&mut conn)
            .await?;

        conn.set_ex::<_, _, ()>(&dedup_key, "1", self.config.visibility_timeout.as_secs().max(3600)).await?;

        info!(job_id = %job.id, chunk_id = %job.chunk_id, message_id = %message_id, "submitted job");

        Ok(message_id)
    }

    /// Clear the deduplication key for a job's `chunk_id`, allowing it to be
    /// resubmitted. Call after terminal completion (success, failure, or DLQ).
    pub async fn clear_dedup(&self, job: &Job) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let dedup_key = format!("equinewatch:dedup:{}", job.idempotency_key);
        conn.del::<_, ()>(&dedup_key).await?;
        debug!("cleared dedup key: {}", dedup_key);
        Ok(())
    }

    /// Acknowledge and remove a processed message.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL").arg(&self.config.stream_name).arg(message_id).query_async::<()>(&mut conn).await?;

        debug!("acknowledged job: {}", message_id);
        Ok(())
    }

    /// Move a job to the dead letter queue (§7, exhausted retries).
    pub async fn dlq(&self, message_id: &str, job: &Job, error: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(job)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(message_id).await?;

        warn!(job_id = %job.id, chunk_id = %job.chunk_id, "moved job to DLQ: {}", error);
        Ok(())
    }

    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Consume new jobs for this consumer.
    pub async fn consume(&self, consumer_name: &str, block_ms: u64, count: usize) -> QueueResult<Vec<(String, Job)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();

        for stream_key in result.keys {
            for entry in stream_key.ids {
                let message_id = entry.id.clone();

                if let Some(redis::Value::BulkString(payload)) = entry.map.get("job") {
                    let payload_str = String::from_utf8_lossy(payload);
                    match serde_json::from_str::<Job>(&payload_str) {
                        Ok(job) => {
                            debug!(job_id = %job.id, "consumed job from stream");
                            jobs.push((message_id, job));
                        }
                        Err(e) => {
                            warn!("failed to parse job payload: {}", e);
                            self.ack(&message_id).await.ok();
                        }
                    }
                }
            }
        }

        Ok(jobs)
    }

    /// Reclaim jobs abandoned by crashed workers: orphaned-job reclamation (§11).
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, Job)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let pending_count: usize = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await
            .map(|reply: redis::streams::StreamPendingReply| reply.count())
            .unwrap_or(0);

        if pending_count == 0 {
            return Ok(Vec::new());
        }

        let pending_details: Vec<Vec<redis::Value>> = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut message_ids_to_claim = Vec::new();
        for detail in pending_details {
            if detail.len() >= 4 {
                if let (Some(redis::Value::BulkString(id_bytes)), Some(redis::Value::Int(idle_ms))) =
                    (detail.get(0), detail.get(2))
                {
                    let idle_ms = *idle_ms as u64;
                    if idle_ms >= min_idle_ms {
                        if let Ok(id) = String::from_utf8(id_bytes.clone()) {
                            message_ids_to_claim.push(id);
                        }
                    }
                }
            }
        }

        if message_ids_to_claim.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.config.stream_name).arg(&self.config.consumer_group).arg(consumer_name).arg(min_idle_ms);

        for msg_id in &message_ids_to_claim {
            cmd.arg(msg_id);
        }

        let claimed_messages: Vec<Vec<redis::Value>> = cmd.query_async(&mut conn).await?;

        let mut jobs = Vec::new();

        for message in claimed_messages {
            if message.len() >= 2 {
                if let (Some(redis::Value::BulkString(id_bytes)), Some(redis::Value::Array(fields))) =
                    (message.get(0), message.get(1))
                {
                    if let Ok(message_id) = String::from_utf8(id_bytes.clone()) {
                        let mut job_payload: Option<String> = None;
                        let mut i = 0;
                        while i < fields.len().saturating_sub(1) {
                            if let (
                                Some(redis::Value::BulkString(field_bytes)),
                                Some(redis::Value::BulkString(value_bytes)),
                            ) = (fields.get(i), fields.get(i + 1))
                            {
                                if let (Ok(field), Ok(value)) =
                                    (String::from_utf8(field_bytes.clone()), String::from_utf8(value_bytes.clone()))
                                {
                                    if field == "job" {
                                        job_payload = Some(value);
                                        break;
                                    }
                                }
                            }
                            i += 2;
                        }

                        if let Some(payload) = job_payload {
                            match serde_json::from_str::<Job>(&payload) {
                                Ok(job) => {
                                    info!(job_id = %job.id, "claimed pending job from crashed worker");
                                    jobs.push((message_id, job));
                                }
                                Err(e) => {
                                    warn!("failed to parse claimed job payload: {}", e);
                                    self.ack(&message_id).await.ok();
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(jobs)
    }

    pub async fn get_retry_count(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("equinewatch:retry:{}", message_id);
        let count: Option<u32> = conn.get(&key).await?;
        Ok(count.unwrap_or(0))
    }

    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("equinewatch:retry:{}", message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, 86400).await?;
        Ok(count)
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Reset the idle timer for a job still being worked on, so it is not
    /// reclaimed by `claim_pending` while legitimately in flight.
    pub async fn refresh_visibility(&self, consumer_name: &str, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let _res: redis::Value = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(0)
            .arg(message_id)
            .arg("JUSTID")
            .query_async(&mut conn)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.stream_name, "equinewatch:jobs");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.visibility_timeout, Duration::from_secs(300));
    }
}
