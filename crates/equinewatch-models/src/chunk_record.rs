//! The persisted per-chunk JSON summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::frame_record::FrameRecord;
use crate::ids::{BarnId, ChunkId, StreamId};

/// Per-identity summary within a chunk (§3 `horses`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorseSummary {
    pub track_id: String,
    pub first_frame: u64,
    pub last_frame: u64,
    pub total_detections: u32,
    pub mean_confidence: f32,
    pub name: Option<String>,
    pub is_official: bool,
}

/// Chunk-level tracker statistics (§3 `summary`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChunkSummary {
    pub total_horses: u32,
    pub active_at_end: u32,
    pub new_tracks_created: u32,
    pub revived_tracks: u32,
}

/// Metadata needed by the reprocessor to faithfully rebuild the overlay
/// video's duration after a processing stride (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub fps: f64,
    pub frame_interval: u32,
}

impl VideoMetadata {
    /// The input frame rate to feed the encoder when re-rendering, reflecting
    /// the stride used during first processing (§4.7 step 6, §4.9).
    pub fn encoder_input_fps(&self) -> f64 {
        self.fps / self.frame_interval as f64
    }
}

/// The full persisted chunk record (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: ChunkId,
    pub stream_id: StreamId,
    pub barn_id: BarnId,
    pub duration_s: f64,
    pub fps: f64,
    pub processing_fps: f64,
    pub frame_count: u64,
    pub processed_at: DateTime<Utc>,
    pub frames: Vec<FrameRecord>,
    pub horses: Vec<HorseSummary>,
    pub summary: ChunkSummary,
    pub video_metadata: VideoMetadata,
}

impl ChunkRecord {
    /// §8 monotone frame order: `frames[i].frame_index < frames[i+1].frame_index`.
    pub fn frames_are_monotone(&self) -> bool {
        self.frames.windows(2).all(|w| w[0].frame_index < w[1].frame_index)
    }
}
