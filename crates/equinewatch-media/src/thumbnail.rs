//! In-memory thumbnail generation for registry entries (§4.7 step 4).
//!
//! Operates on an already-decoded frame crop rather than re-invoking
//! FFmpeg, since the source is a `BoundingBox` region of a frame the
//! tracker already holds in memory.

use image::{imageops::FilterType, RgbImage};

use equinewatch_models::BoundingBox;

use crate::error::{MediaError, MediaResult};

const MAX_THUMBNAIL_SIDE: u32 = 200;
const JPEG_QUALITY: u8 = 80;

/// Crop `bbox` out of `frame`, downscale so the long side is at most
/// `MAX_THUMBNAIL_SIDE` px, and encode as JPEG.
pub fn make_thumbnail(frame: &RgbImage, bbox: &BoundingBox) -> MediaResult<Vec<u8>> {
    let (width, height) = frame.dimensions();

    let x = bbox.x.max(0.0) as u32;
    let y = bbox.y.max(0.0) as u32;
    let w = (bbox.w as u32).min(width.saturating_sub(x)).max(1);
    let h = (bbox.h as u32).min(height.saturating_sub(y)).max(1);

    if x >= width || y >= height {
        return Err(MediaError::internal("thumbnail crop region outside frame bounds"));
    }

    let cropped = image::imageops::crop_imm(frame, x, y, w, h).to_image();

    let (cw, ch) = cropped.dimensions();
    let long_side = cw.max(ch);
    let resized = if long_side > MAX_THUMBNAIL_SIDE {
        let scale = MAX_THUMBNAIL_SIDE as f64 / long_side as f64;
        let nw = ((cw as f64) * scale).round().max(1.0) as u32;
        let nh = ((ch as f64) * scale).round().max(1.0) as u32;
        image::imageops::resize(&cropped, nw, nh, FilterType::Lanczos3)
    } else {
        cropped
    };

    let mut buf = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    encoder
        .encode(resized.as_raw(), resized.width(), resized.height(), image::ColorType::Rgb8)
        .map_err(MediaError::Image)?;

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbnail_downscales_large_crop() {
        let frame = RgbImage::new(800, 600);
        let bbox = BoundingBox::new(0.0, 0.0, 400.0, 300.0);
        let jpeg = make_thumbnail(&frame, &bbox).unwrap();
        assert!(!jpeg.is_empty());
    }

    #[test]
    fn thumbnail_rejects_out_of_bounds_crop() {
        let frame = RgbImage::new(100, 100);
        let bbox = BoundingBox::new(500.0, 500.0, 50.0, 50.0);
        assert!(make_thumbnail(&frame, &bbox).is_err());
    }
}
