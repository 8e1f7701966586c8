//! Client for the external inference service (§2, §6).
//!
//! The pipeline treats three capabilities as pure functions over an external
//! service boundary: a detector (per-frame object boxes), a keypoint
//! estimator (per-box skeleton), and an appearance embedder (per-box unit
//! vector). This crate is the HTTP client for all three, plus the health
//! check and retry/error-classification plumbing they share.

pub mod client;
pub mod error;
pub mod types;

pub use client::{InferenceClient, InferenceConfig};
pub use error::{InferenceError, InferenceResult};
pub use types::{
    DetectRequest, DetectResponse, DetectionBoxWire, EmbedRequest, EmbedResponse, HealthResponse,
    KeypointRequest, KeypointResponse, KeypointWire,
};
