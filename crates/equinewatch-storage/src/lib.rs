//! Durable object storage for chunk outputs and registry thumbnails.
//!
//! This crate provides an R2 (S3-compatible) client for:
//! - Persisting raw and rendered chunk videos plus their JSON summaries
//! - Persisting registry-entry thumbnail crops
//! - Fetching a chunk's raw video back for reprocessing (§4.7)

pub mod client;
pub mod error;
pub mod operations;

pub use client::{ObjectInfo, R2Client, R2Config};
pub use error::{StorageError, StorageResult};
