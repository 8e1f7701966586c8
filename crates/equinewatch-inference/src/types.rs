//! Wire types for the three external inference primitives (§2, §3, §6).
//!
//! The service boundary mirrors the teacher's single-service HTTP client,
//! generalized to the three pure-function primitives this system treats as
//! external: detect, estimate keypoints, and embed appearance.

use serde::{Deserialize, Serialize};

use equinewatch_models::{AppearanceEmbedding, BoundingBox, Detection, Keypoint, Keypoints, NUM_KEYPOINTS};

/// Request to the detector: one frame, base64-encoded PNG bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectRequest {
    pub image_png_base64: String,
    pub confidence_threshold: f32,
}

/// One detected box, in the snapshot contract's `[x1, y1, x2, y2]` shape (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionBoxWire {
    pub bbox: [f64; 4],
    pub confidence: f32,
    pub class_name: String,
}

impl DetectionBoxWire {
    /// The system filters to a single class of interest (§3), so `class_id`
    /// is always 0; `class_name` is carried for observability only.
    pub fn into_detection(self) -> Detection {
        let [x1, y1, x2, y2] = self.bbox;
        Detection::new(
            BoundingBox::new(x1, y1, (x2 - x1).max(0.0), (y2 - y1).max(0.0)),
            self.confidence,
            0,
        )
    }
}

/// Response from the detector (also the snapshot-detection contract in §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    pub horses_detected: bool,
    pub count: u32,
    pub detections: Vec<DetectionBoxWire>,
    pub processing_time_ms: f64,
}

/// Request to the keypoint estimator: one cropped, base64-encoded PNG box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeypointRequest {
    pub crop_png_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeypointWire {
    pub x: f64,
    pub y: f64,
    pub conf: f32,
}

/// Response from the keypoint estimator: exactly [`NUM_KEYPOINTS`] points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeypointResponse {
    pub points: Vec<KeypointWire>,
}

impl KeypointResponse {
    pub fn into_keypoints(self) -> Option<Keypoints> {
        let points: Vec<Keypoint> = self
            .points
            .into_iter()
            .map(|p| Keypoint { x: p.x, y: p.y, conf: p.conf })
            .collect();
        let arr: [Keypoint; NUM_KEYPOINTS] = points.try_into().ok()?;
        Some(Keypoints(arr))
    }
}

/// Request to the appearance embedder: one cropped, base64-encoded PNG box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedRequest {
    pub crop_png_base64: String,
}

/// Response from the appearance embedder: a raw (not necessarily unit-norm)
/// feature vector of dimension D; the client normalizes via
/// [`AppearanceEmbedding::from_raw`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub vector: Vec<f32>,
}

impl EmbedResponse {
    pub fn into_embedding(self) -> Option<AppearanceEmbedding> {
        AppearanceEmbedding::from_raw(self.vector)
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: Option<String>,
}
