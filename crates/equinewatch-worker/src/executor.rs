//! Job executor: claims chunk jobs from the queue and drives them through
//! the pipeline/reprocessor with bounded concurrency (§5, §11).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use equinewatch_models::{Job, JobKind, JobStatus};
use equinewatch_queue::JobQueue;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::pipeline::{process_chunk, PipelineContext};
use crate::reprocessor::reprocess_chunk;

/// Claims and executes jobs from the queue, honoring §5's "single-threaded
/// within a chunk, chunk-granularity parallelism" concurrency model.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    ctx: Arc<PipelineContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: JobQueue, ctx: PipelineContext) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("equinewatch-worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            ctx: Arc::new(ctx),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        let queue_clone = Arc::clone(&self.queue);
        let ctx_clone = Arc::clone(&self.ctx);
        let consumer_name = self.consumer_name.clone();
        let semaphore_clone = Arc::clone(&self.job_semaphore);
        let claim_interval = self.config.claim_interval;
        let claim_min_idle = self.config.claim_min_idle;
        let job_timeout = self.config.job_timeout;
        let shutdown_for_claimed = self.shutdown.clone();
        let mut shutdown_rx_claim = self.shutdown.subscribe();

        // §11: periodically reclaim jobs orphaned by a worker that crashed
        // mid-chunk (visibility timeout elapsed without an ack).
        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if let Ok(len) = queue_clone.len().await {
                            metrics::set_queue_length(len);
                        }
                        if let Ok(dlq_len) = queue_clone.dlq_len().await {
                            metrics::set_dlq_length(dlq_len);
                        }
                        match queue_clone.claim_pending(&consumer_name, claim_min_idle.as_millis() as u64, 5).await {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!("claimed {} orphaned jobs", jobs.len());
                                for (message_id, job) in jobs {
                                    let ctx = Arc::clone(&ctx_clone);
                                    let queue = Arc::clone(&queue_clone);
                                    let cancel = shutdown_for_claimed.subscribe();
                                    let Ok(permit) = semaphore_clone.clone().acquire_owned().await else { break };
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_job(ctx, queue, message_id, job, job_timeout, cancel).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("failed to claim pending jobs: {e}"),
                        }
                    }
                }
            }
        });

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("error consuming jobs: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("waiting for in-flight jobs to complete...");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs()).await;

        info!("job executor stopped");
        Ok(())
    }

    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self.queue.consume(&self.consumer_name, 1000, available.min(5)).await?;
        if jobs.is_empty() {
            return Ok(());
        }

        debug!("consumed {} jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);
            let cancel = self.shutdown.subscribe();
            let job_timeout = self.config.job_timeout;
            let permit = self.job_semaphore.clone().acquire_owned().await.map_err(|_| {
                crate::error::WorkerError::decode_error("job semaphore closed")
            })?;

            metrics::set_jobs_in_flight(
                (self.config.max_concurrent_jobs - self.job_semaphore.available_permits()) as i64,
            );

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, queue, message_id, job, job_timeout, cancel).await;
            });
        }

        Ok(())
    }

    /// Run one job to completion, handling ack/retry/DLQ (§5, §7, §11). The
    /// job future is bounded by `job_timeout`, and `cancel` is threaded down
    /// so a shutdown in progress stops the job at its next suspension point
    /// rather than force-killing it mid-write.
    async fn execute_job(
        ctx: Arc<PipelineContext>,
        queue: Arc<JobQueue>,
        message_id: String,
        job: Job,
        job_timeout: Duration,
        cancel: tokio::sync::watch::Receiver<bool>,
    ) {
        let job_id = job.id.clone();
        let logger = JobLogger::new(&job_id, operation_name(&job.kind));

        let _ = ctx.progress.init_job_status(&job_id, job.chunk_id.as_str(), job.stream_id.as_str()).await;
        let _ = ctx.progress.heartbeat(&job_id).await;

        let operation = operation_name(&job.kind);
        let started = Instant::now();

        // §5: a job that exceeds `job_timeout` is cancelled and marked
        // failed with a timeout error; `cancel` is checked at the pipeline's
        // own suspension points (the per-frame loop) so an on-demand
        // shutdown cancels cleanly rather than being force-killed here.
        let outcome = tokio::time::timeout(job_timeout, async {
            match &job.kind {
                JobKind::ProcessChunk { .. } => process_chunk(&ctx, &job, cancel.clone()).await,
                JobKind::ReprocessChunk { .. } => reprocess_chunk(&ctx, &job, cancel.clone()).await,
            }
        })
        .await;

        let result = outcome.unwrap_or_else(|_| Err(WorkerError::timeout(job_timeout)));

        match result {
            Ok(_) => {
                logger.log_completion("job completed successfully");
                metrics::record_job_completed(operation, started.elapsed().as_secs_f64());
                let _ = ctx.progress.complete_job_status(&job_id).await;
                if let Err(e) = queue.ack(&message_id).await {
                    error!("failed to ack job {job_id}: {e}");
                }
                if let Err(e) = queue.clear_dedup(&job).await {
                    warn!("failed to clear dedup key for job {job_id}: {e}");
                }
            }
            Err(e) => {
                logger.log_error(&format!("job failed: {e}"));
                metrics::record_job_failed(operation);
                let _ = ctx.progress.fail_job_status(&job_id, &e.to_string()).await;

                // §7: timeout/cancellation remove their partial outputs;
                // everything else either already degraded in place or is
                // retried below.
                if e.discards_partial_output() {
                    if let Err(del) = ctx.storage.delete_chunk_files(&job.barn_id, &job.stream_id, &job.chunk_id).await {
                        warn!("failed to clean up partial outputs for job {job_id}: {del}");
                    }
                }

                let retry_count = queue.increment_retry(&message_id).await.unwrap_or(u32::MAX);
                let max_retries = queue.max_retries();

                if !e.is_retryable() || retry_count >= max_retries {
                    warn!("job {job_id} exhausted retries ({retry_count}/{max_retries}), moving to DLQ");
                    metrics::record_job_dlq(operation);
                    if let Err(dlq_err) = queue.dlq(&message_id, &job, &e.to_string()).await {
                        error!("failed to move job {job_id} to DLQ: {dlq_err}");
                    }
                    if let Err(e) = queue.clear_dedup(&job).await {
                        warn!("failed to clear dedup key for job {job_id}: {e}");
                    }
                    let _ = ctx.progress.publish_terminal(&job_id, JobStatus::Failed, Some(e.to_string())).await;
                } else {
                    info!("job {job_id} will be retried (attempt {retry_count}/{max_retries})");
                }
            }
        }
    }

    async fn wait_for_jobs(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

fn operation_name(kind: &JobKind) -> &'static str {
    match kind {
        JobKind::ProcessChunk { .. } => "chunk_processing",
        JobKind::ReprocessChunk { .. } => "reprocessing",
    }
}
