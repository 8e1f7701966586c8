//! Per-frame, post-tracking output records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::color::Rgb;
use crate::ids::TrackId;
use crate::keypoints::Keypoints;
use crate::track::TrackState;

/// Coarse body-state label emitted by the state annotator (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BodyState {
    Standing,
    Walking,
    Running,
    LyingDown,
    #[default]
    Unknown,
}

/// One tracked entry within a `FrameRecord` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedEntry {
    pub track_id: TrackId,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub color: Rgb,
    pub state: TrackState,
    pub is_new: bool,
    pub horse_name: Option<String>,
}

/// A single processed (or placeholder) frame in a chunk (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    pub frame_index: u64,
    pub timestamp: f64,
    pub tracked: Vec<TrackedEntry>,
    /// Present only for a configurable subsample of frames/tracks. A
    /// `BTreeMap` so the chunk JSON serializes keys in a fixed order,
    /// required for reprocess idempotence (§8).
    pub keypoints: BTreeMap<String, Keypoints>,
    pub state_label: BTreeMap<String, BodyState>,
    pub processed: bool,
}

impl FrameRecord {
    pub fn placeholder(frame_index: u64, timestamp: f64) -> Self {
        Self {
            frame_index,
            timestamp,
            tracked: Vec::new(),
            keypoints: BTreeMap::new(),
            state_label: BTreeMap::new(),
            processed: false,
        }
    }
}
