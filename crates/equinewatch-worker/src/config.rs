//! Worker configuration (§5, §6, §11).

use std::time::Duration;

use equinewatch_models::ProcessingOptions;

/// Worker configuration: concurrency/timeout knobs ambient to the chunk
/// pipeline, plus the §6 processing-option defaults new jobs fall back to
/// when a submitter doesn't override them.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum chunks processed concurrently by this worker process (§5: "a
    /// worker may not be shared between two chunks" bounds per in-flight
    /// slot, not the process as a whole).
    pub max_concurrent_jobs: usize,
    /// Maximum concurrent FFmpeg processes (decode + rebuild) across jobs.
    pub max_ffmpeg_processes: usize,
    /// `job_timeout_s` (§5, default 300s): a job exceeding this budget is
    /// cancelled and marked failed with a timeout error.
    pub job_timeout: Duration,
    /// Graceful shutdown drain timeout.
    pub shutdown_timeout: Duration,
    /// Working directory for decoded frame sequences.
    pub work_dir: String,
    /// How often the worker scans for orphaned pending jobs (§11).
    pub claim_interval: Duration,
    /// Minimum idle time before a pending job can be reclaimed (crash
    /// recovery, §11).
    pub claim_min_idle: Duration,
    /// Interval for refreshing job ownership while processing (prevents
    /// premature reclamation of a job still legitimately in flight).
    pub job_heartbeat_interval: Duration,
    /// Default processing options for jobs that don't specify their own.
    pub default_options: ProcessingOptions,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_ffmpeg_processes: 4,
            job_timeout: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(30),
            work_dir: "/tmp/equinewatch".to_string(),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
            job_heartbeat_interval: Duration::from_secs(30),
            default_options: ProcessingOptions::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_jobs),
            max_ffmpeg_processes: std::env::var("WORKER_MAX_FFMPEG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_ffmpeg_processes),
            job_timeout: Duration::from_secs(
                std::env::var("WORKER_JOB_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.job_timeout.as_secs()),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.shutdown_timeout.as_secs()),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR").unwrap_or_else(|_| defaults.work_dir.clone()),
            claim_interval: Duration::from_secs(
                std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.claim_interval.as_secs()),
            ),
            claim_min_idle: Duration::from_secs(
                std::env::var("WORKER_CLAIM_MIN_IDLE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.claim_min_idle.as_secs()),
            ),
            job_heartbeat_interval: Duration::from_secs(
                std::env::var("WORKER_JOB_HEARTBEAT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.job_heartbeat_interval.as_secs()),
            ),
            default_options: defaults.default_options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_budgets() {
        let config = WorkerConfig::default();
        assert_eq!(config.job_timeout, Duration::from_secs(300));
        assert_eq!(config.default_options.max_lost_frames, 30);
    }
}
