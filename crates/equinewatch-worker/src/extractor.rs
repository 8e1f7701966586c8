//! Concrete [`equinewatch_tracker::FeatureExtractor`] backed by the remote
//! inference service (§9 design note: the tracker only ever sees the trait).

use image::{imageops, RgbImage};
use tracing::warn;

use equinewatch_inference::{InferenceClient, InferenceError};
use equinewatch_models::{AppearanceEmbedding, BoundingBox, Keypoints};
use equinewatch_tracker::FeatureExtractor;

/// Wraps an [`InferenceClient`], cropping `frame` to `bbox` before each call.
pub struct RemoteExtractor {
    client: InferenceClient,
}

impl RemoteExtractor {
    pub fn new(client: InferenceClient) -> Self {
        Self { client }
    }
}

/// Crop `frame` to `bbox`, clamped to the frame's bounds. Returns `None` if
/// the clamped region is empty (bbox entirely outside the frame).
fn crop(frame: &RgbImage, bbox: &BoundingBox) -> Option<RgbImage> {
    let (fw, fh) = (frame.width() as f64, frame.height() as f64);
    let x0 = bbox.x.max(0.0).min(fw);
    let y0 = bbox.y.max(0.0).min(fh);
    let x1 = (bbox.x + bbox.w).max(0.0).min(fw);
    let y1 = (bbox.y + bbox.h).max(0.0).min(fh);
    let (w, h) = (x1 - x0, y1 - y0);
    if w < 1.0 || h < 1.0 {
        return None;
    }
    Some(imageops::crop_imm(frame, x0.round() as u32, y0.round() as u32, w.round() as u32, h.round() as u32).to_image())
}

#[async_trait::async_trait]
impl FeatureExtractor for RemoteExtractor {
    async fn embed(&self, frame: &RgbImage, bbox: &BoundingBox) -> Option<AppearanceEmbedding> {
        let crop = crop(frame, bbox)?;
        match self.client.embed(&crop).await {
            Ok(result) => result,
            Err(InferenceError::EmptyCrop) => None,
            Err(e) => {
                warn!("embedding request failed, treating box as ineligible: {e}");
                None
            }
        }
    }

    async fn keypoints(&self, frame: &RgbImage, bbox: &BoundingBox) -> Option<Keypoints> {
        let crop = crop(frame, bbox)?;
        match self.client.estimate_keypoints(&crop).await {
            Ok(result) => result,
            Err(InferenceError::EmptyCrop) => None,
            Err(e) => {
                warn!("keypoint request failed, treating box as ineligible: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_clamps_to_frame_bounds() {
        let frame = RgbImage::new(100, 100);
        let bbox = BoundingBox::new(-10.0, -10.0, 50.0, 50.0);
        let cropped = crop(&frame, &bbox).unwrap();
        assert_eq!(cropped.width(), 40);
        assert_eq!(cropped.height(), 40);
    }

    #[test]
    fn crop_returns_none_when_fully_outside_frame() {
        let frame = RgbImage::new(100, 100);
        let bbox = BoundingBox::new(200.0, 200.0, 50.0, 50.0);
        assert!(crop(&frame, &bbox).is_none());
    }
}
