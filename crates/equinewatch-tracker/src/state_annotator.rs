//! Coarse per-track body-state annotation with hysteresis (§4.4).

use std::collections::{HashMap, VecDeque};

use equinewatch_models::{BodyState, BoundingBox, KeypointName, Keypoints};

/// Confidence floor for the shoulder/paw/neck/hip keypoints §4.4's height
/// and velocity computations gate on, fixed independent of the estimator's
/// configured `keypoint_threshold` (which governs general visibility).
const STATE_CONF_GATE: f32 = 0.4;
/// Length of the raw-label deque the hysteresis rule is evaluated over.
const HYSTERESIS_WINDOW: usize = 15;
/// Minimum relative frequency the mode must reach to become the emitted
/// label; otherwise the previous emission is kept (§4.4).
const HYSTERESIS_MIN_FREQUENCY: f64 = 0.6;

/// Per-track state: a window of raw (pre-hysteresis) labels, the last
/// emitted label, and the previous frame's keypoints (for velocity).
#[derive(Default)]
struct TrackState {
    raw_labels: VecDeque<BodyState>,
    emitted: Option<BodyState>,
    previous_keypoints: Option<Keypoints>,
}

/// Maintains hysteresis state across frames for every track it has seen.
#[derive(Default)]
pub struct StateAnnotator {
    tracks: HashMap<String, TrackState>,
}

impl StateAnnotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Annotate one track in one frame. `track_id` is the string form of the
    /// track's id (matching `FrameRecord.state_label`'s string-keyed map).
    pub fn annotate(&mut self, track_id: &str, keypoints: Option<&Keypoints>, bbox: &BoundingBox) -> BodyState {
        let state = self.tracks.entry(track_id.to_string()).or_default();

        let raw = match keypoints {
            Some(kp) => classify(kp, bbox, state.previous_keypoints.as_ref()),
            None => BodyState::Unknown,
        };

        if state.raw_labels.len() >= HYSTERESIS_WINDOW {
            state.raw_labels.pop_front();
        }
        state.raw_labels.push_back(raw);

        let emitted = match mode_with_frequency(&state.raw_labels) {
            Some((label, freq)) if freq >= HYSTERESIS_MIN_FREQUENCY => label,
            _ => state.emitted.unwrap_or(raw),
        };

        state.emitted = Some(emitted);
        if let Some(kp) = keypoints {
            state.previous_keypoints = Some(kp.clone());
        }
        emitted
    }
}

fn mean_y(kp: &Keypoints, names: &[KeypointName]) -> Option<f64> {
    let visible: Vec<f64> = names.iter().filter_map(|&n| kp.visible(n, STATE_CONF_GATE)).map(|p| p.y).collect();
    if visible.is_empty() {
        None
    } else {
        Some(visible.iter().sum::<f64>() / visible.len() as f64)
    }
}

fn mean_displacement(cur: &Keypoints, prev: &Keypoints, names: &[KeypointName]) -> Option<f64> {
    let mut total = 0.0;
    let mut count = 0usize;
    for &name in names {
        if let (Some(a), Some(b)) = (cur.visible(name, STATE_CONF_GATE), prev.visible(name, STATE_CONF_GATE)) {
            total += ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt();
            count += 1;
        }
    }
    (count > 0).then(|| total / count as f64)
}

fn classify(kp: &Keypoints, bbox: &BoundingBox, previous: Option<&Keypoints>) -> BodyState {
    let shoulder_y = mean_y(kp, &[KeypointName::LeftShoulder, KeypointName::RightShoulder]);
    let paw_y = mean_y(kp, &[KeypointName::LeftWristOrPaw, KeypointName::RightWristOrPaw]);
    let (shoulder_y, paw_y) = match (shoulder_y, paw_y) {
        (Some(s), Some(p)) => (s, p),
        _ => return BodyState::Unknown,
    };

    if bbox.h <= 0.0 {
        return BodyState::Unknown;
    }
    let height_ratio = (shoulder_y - paw_y).abs() / bbox.h;

    let velocity_names =
        [KeypointName::Neck, KeypointName::LeftShoulder, KeypointName::RightShoulder, KeypointName::LeftHip, KeypointName::RightHip];
    let leg_names =
        [KeypointName::LeftWristOrPaw, KeypointName::RightWristOrPaw, KeypointName::LeftElbowOrKnee, KeypointName::RightElbowOrKnee];

    let velocity = previous.and_then(|prev| mean_displacement(kp, prev, &velocity_names)).unwrap_or(0.0);
    let leg_velocity = previous.and_then(|prev| mean_displacement(kp, prev, &leg_names)).unwrap_or(0.0);

    if height_ratio < 0.30 {
        BodyState::LyingDown
    } else if height_ratio > 0.45 {
        if velocity < 3.0 && leg_velocity < 5.0 {
            BodyState::Standing
        } else if velocity > 15.0 || leg_velocity > 20.0 {
            BodyState::Running
        } else if velocity > 5.0 || leg_velocity > 8.0 {
            BodyState::Walking
        } else {
            BodyState::Standing
        }
    } else {
        BodyState::Unknown
    }
}

/// The most frequent label in `labels` and its relative frequency. Ties are
/// broken by whichever label was encountered first in iteration order.
fn mode_with_frequency(labels: &VecDeque<BodyState>) -> Option<(BodyState, f64)> {
    if labels.is_empty() {
        return None;
    }
    let mut counts: Vec<(BodyState, u32)> = Vec::new();
    for &label in labels {
        match counts.iter_mut().find(|(l, _)| *l == label) {
            Some((_, c)) => *c += 1,
            None => counts.push((label, 1)),
        }
    }
    let (best_label, best_count) = counts.into_iter().max_by_key(|(_, c)| *c)?;
    Some((best_label, best_count as f64 / labels.len() as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hysteresis_defeats_a_single_frame_flip() {
        let mut labels = VecDeque::new();
        for _ in 0..14 {
            labels.push_back(BodyState::Standing);
        }
        labels.push_back(BodyState::Running);
        let (label, freq) = mode_with_frequency(&labels).unwrap();
        assert_eq!(label, BodyState::Standing);
        assert!(freq >= HYSTERESIS_MIN_FREQUENCY);
    }

    #[test]
    fn missing_keypoints_yield_unknown() {
        let mut annotator = StateAnnotator::new();
        let bbox = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        let label = annotator.annotate("t1", None, &bbox);
        assert_eq!(label, BodyState::Unknown);
    }

    #[test]
    fn mode_frequency_below_threshold_keeps_previous_emission() {
        let mut annotator = StateAnnotator::new();
        let bbox = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        // Seed an emitted label by calling annotate repeatedly with no
        // keypoints (forces Unknown, which becomes both raw and emitted).
        for _ in 0..15 {
            annotator.annotate("t1", None, &bbox);
        }
        assert_eq!(annotator.tracks["t1"].emitted, Some(BodyState::Unknown));
    }
}
