//! Per-frame, pre-association detector output.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;

/// Default detection confidence floor (§3).
pub const DEFAULT_DETECTION_THRESHOLD: f32 = 0.5;

/// Detection confidence floor used by the snapshot path (§6).
pub const SNAPSHOT_DETECTION_THRESHOLD: f32 = 0.3;

/// A single object box returned by the detector for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: i64,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32, class_id: i64) -> Self {
        Self { bbox, confidence, class_id }
    }

    /// `confidence >= threshold` and the box is geometrically valid.
    pub fn passes_threshold(&self, threshold: f32) -> bool {
        self.bbox.is_valid() && self.confidence >= threshold
    }
}
