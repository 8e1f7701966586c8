//! Capability-set interface over the external detector/estimator/embedder
//! backends (§9 design note: "dynamic dispatch on backend models").
//!
//! The tracker never holds a concrete inference client; it is handed a
//! `&dyn FeatureExtractor` for the duration of a frame. The worker crate
//! supplies the concrete `{remote, local, mock}` implementation.

use async_trait::async_trait;
use image::RgbImage;

use equinewatch_models::{AppearanceEmbedding, BoundingBox, Keypoints};

/// Crops and embeds/estimates keypoints for a single bounding box.
///
/// `None` from either method signals a degenerate or out-of-frame crop and
/// is treated by the caller as "ineligible", per §4.2 Failure — never as an
/// error to propagate.
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    /// Appearance embedding for the crop at `bbox` in `frame`.
    async fn embed(&self, frame: &RgbImage, bbox: &BoundingBox) -> Option<AppearanceEmbedding>;

    /// Keypoints for the crop at `bbox` in `frame`.
    async fn keypoints(&self, frame: &RgbImage, bbox: &BoundingBox) -> Option<Keypoints>;
}

/// A `FeatureExtractor` that never produces a result, useful for exercising
/// the tracker's stage-2 failure path (§4.2 Failure) in tests without a real
/// inference backend.
pub struct NullExtractor;

#[async_trait]
impl FeatureExtractor for NullExtractor {
    async fn embed(&self, _frame: &RgbImage, _bbox: &BoundingBox) -> Option<AppearanceEmbedding> {
        None
    }

    async fn keypoints(&self, _frame: &RgbImage, _bbox: &BoundingBox) -> Option<Keypoints> {
        None
    }
}
