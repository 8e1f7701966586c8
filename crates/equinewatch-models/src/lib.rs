//! Shared data model for the horse-monitoring video pipeline.
//!
//! This crate provides serde-serializable types for:
//! - The per-frame/per-chunk data model (bounding boxes, detections,
//!   keypoints, appearance embeddings, tracks, frame and chunk records)
//! - Human corrections applied by the reprocessor
//! - The hot/warm identity registry's serialized entry shape
//! - Job definitions and status caching for the scheduler interface

pub mod bbox;
pub mod chunk_record;
pub mod color;
pub mod correction;
pub mod detection;
pub mod embedding;
pub mod frame_record;
pub mod ids;
pub mod job;
pub mod job_status;
pub mod keypoints;
pub mod registry_entry;
pub mod track;

pub use bbox::BoundingBox;
pub use chunk_record::{ChunkRecord, ChunkSummary, HorseSummary, VideoMetadata};
pub use color::{color_for_label, Rgb};
pub use correction::{Correction, CorrectionType};
pub use detection::{Detection, DEFAULT_DETECTION_THRESHOLD, SNAPSHOT_DETECTION_THRESHOLD};
pub use embedding::{AppearanceEmbedding, EMBEDDING_DIM};
pub use frame_record::{BodyState, FrameRecord, TrackedEntry};
pub use ids::{BarnId, ChunkId, StreamId, TrackId};
pub use job::{Job, JobId, JobKind, JobState, ProcessingOptions};
pub use job_status::{JobStatus, JobStatusCache};
pub use keypoints::{Keypoint, KeypointName, Keypoints, DEFAULT_KEYPOINT_THRESHOLD, NUM_KEYPOINTS, SKELETON_EDGES};
pub use registry_entry::{RegistryEntry, RegistryStatus};
pub use track::{BboxObservation, BoundedHistory, Track, TrackState, HISTORY_BOUND, VELOCITY_HISTORY_BOUND};
