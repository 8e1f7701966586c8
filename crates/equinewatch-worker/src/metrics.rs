//! Prometheus metrics for the worker process.
//!
//! The worker has no HTTP router of its own (§12 excludes the front door),
//! so metrics are served directly by `metrics-exporter-prometheus`'s own
//! listener rather than mounted as a route.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and start its scrape listener.
pub fn init_metrics(bind_addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new().with_http_listener(bind_addr).install()?;
    Ok(())
}

pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "equinewatch_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "equinewatch_jobs_failed_total";
    pub const JOBS_DLQ_TOTAL: &str = "equinewatch_jobs_dlq_total";
    pub const JOB_DURATION_SECONDS: &str = "equinewatch_job_duration_seconds";
    pub const JOBS_IN_FLIGHT: &str = "equinewatch_jobs_in_flight";
    pub const QUEUE_LENGTH: &str = "equinewatch_queue_length";
    pub const QUEUE_DLQ_LENGTH: &str = "equinewatch_queue_dlq_length";
    pub const FFMPEG_DURATION_SECONDS: &str = "equinewatch_ffmpeg_duration_seconds";
}

pub fn record_job_completed(operation: &str, duration_secs: f64) {
    let labels = [("operation", operation.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_job_failed(operation: &str) {
    let labels = [("operation", operation.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_job_dlq(operation: &str) {
    let labels = [("operation", operation.to_string())];
    counter!(names::JOBS_DLQ_TOTAL, &labels).increment(1);
}

pub fn set_jobs_in_flight(count: i64) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}

pub fn set_queue_length(length: u64) {
    gauge!(names::QUEUE_LENGTH).set(length as f64);
}

pub fn set_dlq_length(length: u64) {
    gauge!(names::QUEUE_DLQ_LENGTH).set(length as f64);
}

pub fn record_ffmpeg_duration(stage: &str, duration_secs: f64) {
    let labels = [("stage", stage.to_string())];
    histogram!(names::FFMPEG_DURATION_SECONDS, &labels).record(duration_secs);
}
