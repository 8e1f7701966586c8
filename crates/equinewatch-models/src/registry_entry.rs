//! The hot/warm serialized state of a track (§3, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::ids::{BarnId, StreamId, TrackId};

/// Warm-registry lifecycle status (§6 logical columns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistryStatus {
    #[default]
    Active,
    Archived,
}

/// Serialized track identity, as written to hot or warm storage (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: TrackId,
    pub stream_id: StreamId,
    pub barn_id: BarnId,
    pub name: Option<String>,
    pub is_official: bool,
    pub color_hex: String,
    pub last_updated_time: DateTime<Utc>,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub features: Vec<f32>,
    pub total_detections: u32,
    pub tracking_confidence: f32,
    pub status: RegistryStatus,
    pub thumbnail_bytes: Option<Vec<u8>>,
}

impl RegistryEntry {
    /// The hot-tier key format (§6): `horse:<stream_id>:<track_id>:state`.
    pub fn hot_key(stream_id: &StreamId, track_id: &TrackId) -> String {
        format!("horse:{}:{}:state", stream_id.0, track_id.0)
    }
}
