#![deny(unreachable_patterns)]
//! Chunk-processing worker.
//!
//! This crate provides:
//! - Job executor claiming `ProcessChunk`/`ReprocessChunk` jobs from the queue
//! - The chunk pipeline: decode, track, annotate, render, rebuild, persist
//! - The reprocessor: apply corrections and rebuild a chunk's outputs
//! - Progress emission and graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod reprocessor;
pub mod retry;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use extractor::RemoteExtractor;
pub use logging::JobLogger;
pub use pipeline::{process_chunk, PipelineContext};
pub use reprocessor::reprocess_chunk;
