//! Deterministic overlay rendering (§4.5).
//!
//! Draws a filled-border box per tracked entry in the track's color,
//! a label (name if known, else `#id`), and the visible skeleton
//! edges for any keypoints present on that frame. Given identical
//! inputs this produces byte-identical output: no randomness, no
//! dependence on drawing order beyond the fixed iteration order of
//! `FrameRecord::tracked`.

use image::{Rgb as ImageRgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};

use equinewatch_models::{BoundingBox, FrameRecord, Keypoint, Keypoints, Rgb, SKELETON_EDGES};

const BOX_BORDER_PX: u32 = 3;
const LABEL_SCALE: f32 = 18.0;

fn to_image_rgb(c: Rgb) -> ImageRgb<u8> {
    ImageRgb([c.0, c.1, c.2])
}

fn clamp_rect(bbox: &BoundingBox, width: u32, height: u32) -> Option<Rect> {
    let x = bbox.x.max(0.0) as i32;
    let y = bbox.y.max(0.0) as i32;
    let w = (bbox.w.min(width as f64 - x as f64)).max(1.0) as u32;
    let h = (bbox.h.min(height as f64 - y as f64)).max(1.0) as u32;
    if x >= width as i32 || y >= height as i32 {
        return None;
    }
    Some(Rect::at(x, y).of_size(w.max(1), h.max(1)))
}

/// Render the tracked entries and (if present) skeletons for one frame
/// onto `image` in place.
pub fn render_overlay(image: &mut RgbImage, record: &FrameRecord, font: Option<&Font>) {
    let (width, height) = image.dimensions();

    for entry in &record.tracked {
        let color = to_image_rgb(entry.color);

        if let Some(rect) = clamp_rect(&entry.bbox, width, height) {
            for offset in 0..BOX_BORDER_PX {
                if rect.width() <= 2 * offset || rect.height() <= 2 * offset {
                    break;
                }
                let inset = Rect::at(rect.left() + offset as i32, rect.top() + offset as i32)
                    .of_size(rect.width() - 2 * offset, rect.height() - 2 * offset);
                draw_hollow_rect_mut(image, inset, color);
            }
        }

        let label = entry
            .horse_name
            .clone()
            .unwrap_or_else(|| format!("#{}", entry.track_id));

        if let Some(font) = font {
            let label_x = entry.bbox.x.max(0.0) as i32;
            let label_y = (entry.bbox.y.max(0.0) - LABEL_SCALE as f64).max(0.0) as i32;
            draw_text_mut(
                image,
                color,
                label_x,
                label_y,
                Scale::uniform(LABEL_SCALE),
                font,
                &label,
            );
        }

        if let Some(keypoints) = record.keypoints.get(&entry.track_id.to_string()) {
            render_skeleton(image, keypoints, color);
        }
    }
}

fn render_skeleton(image: &mut RgbImage, keypoints: &Keypoints, color: ImageRgb<u8>) {
    const VISIBLE_THRESHOLD: f32 = 0.3;

    let visible = |kp: Keypoint| kp.is_visible(VISIBLE_THRESHOLD);

    for &(a, b) in SKELETON_EDGES {
        let ka = keypoints.0[a];
        let kb = keypoints.0[b];
        if !visible(ka) || !visible(kb) {
            continue;
        }
        draw_line_segment_mut(
            image,
            (ka.x as f32, ka.y as f32),
            (kb.x as f32, kb.y as f32),
            color,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use equinewatch_models::{color_for_label, BodyState, BoundingBox, TrackId, TrackedEntry};

    fn sample_record() -> FrameRecord {
        let mut record = FrameRecord::placeholder(0, 0.0);
        record.tracked.push(TrackedEntry {
            track_id: TrackId::new("1"),
            bbox: BoundingBox::new(10.0, 10.0, 50.0, 40.0),
            confidence: 0.9,
            color: color_for_label(1),
            state: equinewatch_models::TrackState::Active,
            is_new: true,
            horse_name: None,
        });
        record.state_label.insert("1".to_string(), BodyState::Standing);
        record
    }

    #[test]
    fn overlay_draws_without_panicking_on_edge_boxes() {
        let mut image = RgbImage::new(64, 64);
        let record = sample_record();
        render_overlay(&mut image, &record, None);
    }

    #[test]
    fn overlay_is_deterministic_for_identical_inputs() {
        let record = sample_record();
        let mut a = RgbImage::new(64, 64);
        let mut b = RgbImage::new(64, 64);
        render_overlay(&mut a, &record, None);
        render_overlay(&mut b, &record, None);
        assert_eq!(a.into_raw(), b.into_raw());
    }
}
