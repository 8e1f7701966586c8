//! Redis/Queue integration tests.

use equinewatch_models::{BarnId, ChunkId, Correction, CorrectionType, Job, JobId, JobStatus, ProcessingOptions, StreamId};
use equinewatch_queue::{JobQueue, ProgressChannel};

fn ids() -> (ChunkId, StreamId, BarnId) {
    (
        ChunkId::new(format!("it-chunk-{}", uuid::Uuid::new_v4())),
        StreamId::new("it-stream-1"),
        BarnId::new("it-barn-1"),
    )
}

/// Test Redis connection and basic operations.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_connection() {
    dotenvy::dotenv().ok();

    let queue = JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let len = queue.len().await.expect("Failed to get queue length");
    println!("Queue length: {}", len);
}

/// Test job submit/consume/ack cycle, including idempotency-key dedup (§4.8).
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_job_submit_consume_ack() {
    dotenvy::dotenv().ok();

    let queue = JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let (chunk_id, stream_id, barn_id) = ids();
    let job = Job::new_process_chunk(
        chunk_id,
        stream_id,
        barn_id,
        "/tmp/it-chunk.mp4",
        "/tmp/it-chunk.rendered.mp4",
        "/tmp/it-chunk.json",
        1,
        ProcessingOptions::default(),
    );
    let job_id = job.id.clone();

    let message_id = queue.submit(&job).await.expect("Failed to submit");
    println!("Submitted job {} with message ID {}", job_id, message_id);

    // Resubmitting the same idempotency key must be rejected, not queued twice.
    let second = queue.submit(&job).await;
    assert!(second.is_err(), "duplicate idempotency key should be rejected");

    let consumer_name = "test-consumer";
    let jobs = queue.consume(consumer_name, 1000, 1).await.expect("Failed to consume");

    assert_eq!(jobs.len(), 1);
    let (msg_id, consumed_job) = &jobs[0];
    assert_eq!(consumed_job.id, job_id);

    queue.ack(msg_id).await.expect("Failed to ack");
    queue.clear_dedup(&job).await.expect("Failed to clear dedup key");
    println!("Job {} acknowledged", job_id);
}

/// Test DLQ functionality.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_dlq() {
    dotenvy::dotenv().ok();

    let queue = JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let (chunk_id, stream_id, barn_id) = ids();
    let job = Job::new_process_chunk(
        chunk_id,
        stream_id,
        barn_id,
        "/tmp/it-dlq-chunk.mp4",
        "/tmp/it-dlq-chunk.rendered.mp4",
        "/tmp/it-dlq-chunk.json",
        1,
        ProcessingOptions::default(),
    );

    let message_id = queue.submit(&job).await.expect("Failed to submit");

    let consumer_name = "test-dlq-consumer";
    let jobs = queue.consume(consumer_name, 1000, 1).await.expect("Failed to consume");
    assert!(!jobs.is_empty());

    queue
        .dlq(&message_id, &job, "simulated processing failure")
        .await
        .expect("Failed to move to DLQ");

    let dlq_len = queue.dlq_len().await.expect("Failed to get DLQ length");
    assert!(dlq_len > 0);
    println!("DLQ length: {}", dlq_len);
}

/// Exercises the reprocessing job shape (§4.7, §6).
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_reprocess_job_roundtrip() {
    dotenvy::dotenv().ok();

    let queue = JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let (chunk_id, stream_id, barn_id) = ids();
    let correction = Correction {
        frame_index: 0,
        detection_index: 0,
        correction_type: CorrectionType::MarkIncorrect,
        original_horse_id: "it-track-1".to_string(),
        corrected_horse_id: None,
        corrected_horse_name: None,
    };
    let job = Job::new_reprocess_chunk(chunk_id, stream_id, barn_id, vec![correction]);

    let message_id = queue.submit(&job).await.expect("Failed to submit");
    let jobs = queue
        .consume("test-reprocess-consumer", 1000, 1)
        .await
        .expect("Failed to consume");
    assert_eq!(jobs.len(), 1);

    queue.ack(&message_id).await.expect("Failed to ack");
    queue.clear_dedup(&job).await.expect("Failed to clear dedup key");
}

/// Test progress channel pub/sub (§4.8).
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_progress_channel() {
    use futures_util::StreamExt;
    use std::time::Duration;

    dotenvy::dotenv().ok();

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let progress = ProgressChannel::new(&redis_url).expect("Failed to create progress channel");

    let job_id = JobId::new();

    let progress_clone = progress.clone();
    let job_id_clone = job_id.clone();
    let subscriber = tokio::spawn(async move {
        let mut stream = progress_clone.subscribe(&job_id_clone).await.expect("Failed to subscribe");
        let mut messages = Vec::new();

        let timeout = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(event) = stream.next().await {
                messages.push(event);
                if messages.len() >= 2 {
                    break;
                }
            }
        });

        let _ = timeout.await;
        messages
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    progress.publish_progress(&job_id, 50, "tracking").await.ok();
    progress
        .publish_terminal(&job_id, JobStatus::Completed, None)
        .await
        .ok();

    let messages = subscriber.await.expect("Subscriber task failed");
    println!("Received {} messages", messages.len());
}

/// Test heartbeat/staleness tracking used by the orphaned-job reclaimer (§5, §11).
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_heartbeat_liveness() {
    dotenvy::dotenv().ok();

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let progress = ProgressChannel::new(&redis_url).expect("Failed to create progress channel");

    let job_id = JobId::new();
    progress.heartbeat(&job_id).await.expect("Failed to heartbeat");

    let alive = progress.is_alive(&job_id).await.expect("Failed to check liveness");
    assert!(alive);

    progress.clear_heartbeat(&job_id).await.expect("Failed to clear heartbeat");
    let alive_after_clear = progress.is_alive(&job_id).await.expect("Failed to check liveness");
    assert!(!alive_after_clear);
}
