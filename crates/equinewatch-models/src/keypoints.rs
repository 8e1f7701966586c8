//! Fixed-length per-box keypoint array.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Number of keypoints tracked per detection, fixed at build time.
pub const NUM_KEYPOINTS: usize = 17;

/// Default confidence floor below which a keypoint is treated as missing.
pub const DEFAULT_KEYPOINT_THRESHOLD: f32 = 0.3;

/// Named keypoint indices, in the fixed ordering used throughout the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum KeypointName {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    Neck = 5,
    LeftShoulder = 6,
    RightShoulder = 7,
    LeftElbowOrKnee = 8,
    RightElbowOrKnee = 9,
    LeftWristOrPaw = 10,
    RightWristOrPaw = 11,
    LeftHip = 12,
    RightHip = 13,
    LeftHock = 14,
    RightHock = 15,
    TailBase = 16,
}

/// The skeleton edge list used by the overlay renderer (§4.5), expressed as
/// pairs of keypoint indices.
pub const SKELETON_EDGES: &[(usize, usize)] = &[
    (KeypointName::Nose as usize, KeypointName::LeftEye as usize),
    (KeypointName::Nose as usize, KeypointName::RightEye as usize),
    (KeypointName::LeftEye as usize, KeypointName::LeftEar as usize),
    (KeypointName::RightEye as usize, KeypointName::RightEar as usize),
    (KeypointName::Nose as usize, KeypointName::Neck as usize),
    (KeypointName::Neck as usize, KeypointName::LeftShoulder as usize),
    (KeypointName::Neck as usize, KeypointName::RightShoulder as usize),
    (KeypointName::LeftShoulder as usize, KeypointName::LeftElbowOrKnee as usize),
    (KeypointName::LeftElbowOrKnee as usize, KeypointName::LeftWristOrPaw as usize),
    (KeypointName::RightShoulder as usize, KeypointName::RightElbowOrKnee as usize),
    (KeypointName::RightElbowOrKnee as usize, KeypointName::RightWristOrPaw as usize),
    (KeypointName::Neck as usize, KeypointName::LeftHip as usize),
    (KeypointName::Neck as usize, KeypointName::RightHip as usize),
    (KeypointName::LeftHip as usize, KeypointName::LeftHock as usize),
    (KeypointName::RightHip as usize, KeypointName::RightHock as usize),
    (KeypointName::LeftHip as usize, KeypointName::TailBase as usize),
    (KeypointName::RightHip as usize, KeypointName::TailBase as usize),
];

/// A single keypoint: pixel position plus estimator confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    pub conf: f32,
}

impl Keypoint {
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.conf >= threshold
    }
}

/// Fixed-length keypoint array for one detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Keypoints(pub [Keypoint; NUM_KEYPOINTS]);

impl Keypoints {
    pub fn get(&self, name: KeypointName) -> Keypoint {
        self.0[name as usize]
    }

    pub fn visible(&self, name: KeypointName, threshold: f32) -> Option<Keypoint> {
        let kp = self.get(name);
        kp.is_visible(threshold).then_some(kp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skeleton_edges_reference_valid_indices() {
        for &(a, b) in SKELETON_EDGES {
            assert!(a < NUM_KEYPOINTS);
            assert!(b < NUM_KEYPOINTS);
        }
    }
}
