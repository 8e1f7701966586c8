//! In-memory track state, maintained by the tracker for the worker lifetime.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::color::{color_for_label, Rgb};
use crate::embedding::AppearanceEmbedding;
use crate::ids::TrackId;

/// Bound on `feature_history` and `bbox_history` (§3).
pub const HISTORY_BOUND: usize = 100;
/// Bound on `velocity_history` (§3).
pub const VELOCITY_HISTORY_BOUND: usize = 10;

/// A track's lifecycle state (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    Active,
    Lost,
    Archived,
}

/// A bounded deque that evicts its oldest element once it reaches `bound`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundedHistory<T> {
    bound: usize,
    items: VecDeque<T>,
}

impl<T> BoundedHistory<T> {
    pub fn new(bound: usize) -> Self {
        Self { bound, items: VecDeque::with_capacity(bound) }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() >= self.bound {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn last_n(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip)
    }
}

/// One observation recorded in `bbox_history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BboxObservation {
    pub t: f64,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// A persistent identity (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub numeric_label: u32,
    pub color: Rgb,
    pub last_bbox: BoundingBox,
    pub last_frame_seen: u64,
    pub last_time_seen: f64,
    pub feature_vector: AppearanceEmbedding,
    pub feature_history: BoundedHistory<AppearanceEmbedding>,
    pub bbox_history: BoundedHistory<BboxObservation>,
    pub velocity_history: BoundedHistory<f64>,
    pub state: TrackState,
    pub frames_since_seen: u32,
    pub total_detections: u32,
    pub track_confidence: f32,
    pub first_appearance_feature: AppearanceEmbedding,
    pub name: Option<String>,
    pub is_official: bool,
}

impl Track {
    pub fn new(
        id: TrackId,
        numeric_label: u32,
        bbox: BoundingBox,
        frame_index: u64,
        time_seen: f64,
        confidence: f32,
        feature: AppearanceEmbedding,
    ) -> Self {
        let mut bbox_history = BoundedHistory::new(HISTORY_BOUND);
        bbox_history.push(BboxObservation { t: time_seen, bbox, confidence });
        let mut feature_history = BoundedHistory::new(HISTORY_BOUND);
        feature_history.push(feature.clone());

        Self {
            id,
            numeric_label,
            color: color_for_label(numeric_label),
            last_bbox: bbox,
            last_frame_seen: frame_index,
            last_time_seen: time_seen,
            feature_vector: feature.clone(),
            feature_history,
            bbox_history,
            velocity_history: BoundedHistory::new(VELOCITY_HISTORY_BOUND),
            state: TrackState::Active,
            frames_since_seen: 0,
            total_detections: 1,
            track_confidence: confidence,
            first_appearance_feature: feature,
            name: None,
            is_official: false,
        }
    }

    /// Linear extrapolation of the next bbox position from the last two
    /// observations and elapsed `dt` (§4.2 step 1). Falls back to `last_bbox`
    /// with fewer than two observations.
    pub fn predicted_bbox(&self, dt: f64) -> BoundingBox {
        let mut it = self.bbox_history.last_n(2);
        let (first, second) = (it.next(), it.next());
        match (first, second) {
            (Some(a), Some(b)) if b.t > a.t => {
                let elapsed = b.t - a.t;
                let (ax, ay) = a.bbox.center();
                let (bx, by) = b.bbox.center();
                let vx = (bx - ax) / elapsed;
                let vy = (by - ay) / elapsed;
                self.last_bbox.translate(vx * dt, vy * dt)
            }
            _ => self.last_bbox,
        }
    }
}
