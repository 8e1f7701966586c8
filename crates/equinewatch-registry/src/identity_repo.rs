//! Two-tier identity registry: hot (Redis, TTL'd) + warm (durable REST store).
//!
//! Implements the four operations of §4.3: `LoadBarn`, `SaveBarn`,
//! `ExpireHot`, `Cleanup`. Warm is authoritative for identity; hot is a
//! short-horizon cache. On conflict, hot wins for volatile fields (bbox,
//! last_updated_time, total_detections); warm wins for `name` and
//! `is_official`.

use std::collections::HashMap;

use base64::Engine;
use chrono::{DateTime, Utc};
use equinewatch_models::{AppearanceEmbedding, BarnId, BoundingBox, RegistryEntry, RegistryStatus, StreamId, TrackId};
use tracing::warn;

use crate::client::RegistryClient;
use crate::error::{RegistryError, RegistryResult};
use crate::hot_store::HotStore;
use crate::types::{Document, FromFirestoreValue, ToFirestoreValue, Value, Write};

const WARM_COLLECTION: &str = "registry_entries";

/// Warm-tier one-shot feature blend weight (on the *old* embedding) applied
/// in `SaveBarn` and reprocessing feature updates: `old.blend(new, 0.3)` =
/// `0.3·old + 0.7·new`, distinct from the tracker's per-frame EMA (α=0.8) —
/// preserved deliberately per the open question on blend weights.
pub const WARM_BLEND_OLD_WEIGHT: f32 = 0.3;

/// Combines the hot and warm tiers behind the four §4.3 operations.
pub struct IdentityRegistry {
    hot: HotStore,
    warm: RegistryClient,
}

impl IdentityRegistry {
    pub fn new(hot: HotStore, warm: RegistryClient) -> Self {
        Self { hot, warm }
    }

    /// `LoadBarn(barn_id, stream_id) -> map<track_id, RegistryEntry>`.
    ///
    /// Queries warm for every active entry in the barn (oldest-first,
    /// officials pinned first), then shadows with hot entries for the
    /// streams under that barn (hot is fresher).
    pub async fn load_barn(
        &self,
        barn_id: &BarnId,
        stream_ids: &[StreamId],
    ) -> RegistryResult<HashMap<TrackId, RegistryEntry>> {
        let mut warm_entries = self.warm_active_for_barn(barn_id).await?;
        warm_entries.sort_by(|a, b| {
            b.is_official
                .cmp(&a.is_official)
                .then(a.last_updated_time.cmp(&b.last_updated_time))
        });

        let mut by_id: HashMap<TrackId, RegistryEntry> =
            warm_entries.into_iter().map(|e| (e.id.clone(), e)).collect();

        for stream_id in stream_ids {
            let hot_entries = self.hot.scan_stream(stream_id).await?;
            for hot in hot_entries {
                match by_id.get_mut(&hot.id) {
                    Some(warm) => shadow_with_hot(warm, hot),
                    None => {
                        by_id.insert(hot.id.clone(), hot);
                    }
                }
            }
        }

        Ok(by_id)
    }

    /// `SaveBarn(barn_id, map<track_id, RegistryEntry>)`.
    ///
    /// Writes every entry to hot (TTL reset) and upserts it to warm,
    /// preserving `is_official`/`name` and one-shot-blending features.
    pub async fn save_barn(
        &self,
        barn_id: &BarnId,
        entries: &HashMap<TrackId, RegistryEntry>,
    ) -> RegistryResult<()> {
        for entry in entries.values() {
            self.hot.put(&entry.stream_id, entry).await?;
        }

        let mut writes = Vec::with_capacity(entries.len());
        for entry in entries.values() {
            let merged = self.blend_with_existing_warm(entry).await?;
            let fields = entry_to_fields(&merged);
            writes.push(Write {
                update: Some(Document {
                    name: Some(self.warm.full_document_name(WARM_COLLECTION, entry.id.as_str())),
                    fields: Some(fields),
                    create_time: None,
                    update_time: None,
                }),
                delete: None,
                update_mask: None,
                current_document: None,
            });
        }

        if !writes.is_empty() {
            let _ = barn_id;
            self.warm.batch_write(writes).await?;
        }
        Ok(())
    }

    /// `ExpireHot(stream_id)`: purge expired entries only.
    pub async fn expire_hot(&self, stream_id: &StreamId) -> RegistryResult<u32> {
        self.hot.expire_hot(stream_id).await
    }

    /// `Cleanup(hot_stale_cutoff)`: sweep hot by `last_updated_time < now - TTL`.
    pub async fn cleanup(&self) -> RegistryResult<u32> {
        self.hot.cleanup().await
    }

    /// Vector lookup by feature over a barn's active warm entries — the
    /// warm tier's "lookup by feature" capability (§4.3), used for
    /// cross-stream continuity (§3 example 6).
    pub async fn find_by_feature(
        &self,
        barn_id: &BarnId,
        query: &[f32],
        min_cosine: f32,
    ) -> RegistryResult<Option<RegistryEntry>> {
        let query = AppearanceEmbedding(query.to_vec());
        let candidates = self.warm_active_for_barn(barn_id).await?;
        let mut best: Option<(f32, RegistryEntry)> = None;
        for entry in candidates {
            let candidate = AppearanceEmbedding(entry.features.clone());
            let score = query.cosine_similarity(&candidate);
            if score >= min_cosine {
                match &best {
                    Some((best_score, _)) if *best_score >= score => {}
                    _ => best = Some((score, entry)),
                }
            }
        }
        Ok(best.map(|(_, e)| e))
    }

    async fn warm_active_for_barn(&self, barn_id: &BarnId) -> RegistryResult<Vec<RegistryEntry>> {
        let docs = self.warm.list_all_documents(WARM_COLLECTION).await?;
        let mut entries = Vec::new();
        for doc in docs {
            match entry_from_document(&doc) {
                Ok(entry) => {
                    if &entry.barn_id == barn_id && entry.status == RegistryStatus::Active {
                        entries.push(entry);
                    }
                }
                Err(e) => warn!(error = %e, "dropping corrupt warm entry"),
            }
        }
        Ok(entries)
    }

    /// Load the existing warm entry (if any) and blend features per the
    /// one-shot `old.blend(new, 0.3)` rule, preserving `is_official`/`name`.
    async fn blend_with_existing_warm(&self, incoming: &RegistryEntry) -> RegistryResult<RegistryEntry> {
        let existing = self
            .warm
            .get_document(WARM_COLLECTION, incoming.id.as_str())
            .await?
            .and_then(|doc| entry_from_document(&doc).ok());

        match existing {
            None => Ok(incoming.clone()),
            Some(old) => {
                let mut merged = incoming.clone();
                merged.name = old.name.or(merged.name);
                merged.is_official = old.is_official || merged.is_official;
                merged.features = blend_and_normalize(&merged.features, &old.features);
                Ok(merged)
            }
        }
    }
}

/// Hot wins for volatile fields; warm wins for `name`/`is_official` (§4.3
/// Ordering).
fn shadow_with_hot(warm: &mut RegistryEntry, hot: RegistryEntry) {
    warm.bbox = hot.bbox;
    warm.last_updated_time = hot.last_updated_time;
    warm.total_detections = hot.total_detections;
    warm.confidence = hot.confidence;
    warm.tracking_confidence = hot.tracking_confidence;
}

/// `old.blend(new, 0.3)` = `0.3·old + 0.7·new`, renormalized to unit L2 norm
/// (§4.3, §4.7). Falls back to `new` unchanged if there is no prior feature
/// vector to blend against.
pub fn blend_and_normalize(new: &[f32], old: &[f32]) -> Vec<f32> {
    if old.is_empty() || old.len() != new.len() {
        return new.to_vec();
    }
    let old = AppearanceEmbedding(old.to_vec());
    let new = AppearanceEmbedding(new.to_vec());
    old.blend(&new, WARM_BLEND_OLD_WEIGHT).0
}

fn field(fields: &HashMap<String, Value>, key: &str) -> Option<Value> {
    fields.get(key).cloned()
}

fn entry_to_fields(entry: &RegistryEntry) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("id".to_string(), entry.id.as_str().to_firestore_value());
    fields.insert("stream_id".to_string(), entry.stream_id.as_str().to_firestore_value());
    fields.insert("barn_id".to_string(), entry.barn_id.as_str().to_firestore_value());
    fields.insert("name".to_string(), entry.name.to_firestore_value());
    fields.insert("is_official".to_string(), entry.is_official.to_firestore_value());
    fields.insert("color_hex".to_string(), entry.color_hex.to_firestore_value());
    fields.insert("last_updated_time".to_string(), entry.last_updated_time.to_firestore_value());
    fields.insert(
        "bbox".to_string(),
        Value::MapValue(crate::types::MapValue {
            fields: Some(HashMap::from([
                ("x".to_string(), entry.bbox.x.to_firestore_value()),
                ("y".to_string(), entry.bbox.y.to_firestore_value()),
                ("w".to_string(), entry.bbox.w.to_firestore_value()),
                ("h".to_string(), entry.bbox.h.to_firestore_value()),
            ])),
        }),
    );
    fields.insert("confidence".to_string(), entry.confidence.to_firestore_value());
    fields.insert("features".to_string(), entry.features.to_firestore_value());
    fields.insert("total_detections".to_string(), entry.total_detections.to_firestore_value());
    fields.insert("tracking_confidence".to_string(), entry.tracking_confidence.to_firestore_value());
    fields.insert(
        "status".to_string(),
        match entry.status {
            RegistryStatus::Active => "active",
            RegistryStatus::Archived => "archived",
        }
        .to_firestore_value(),
    );
    if let Some(thumb) = &entry.thumbnail_bytes {
        fields.insert(
            "thumbnail_bytes".to_string(),
            Value::BytesValue(base64::engine::general_purpose::STANDARD.encode(thumb)),
        );
    }
    fields
}

fn entry_from_document(doc: &Document) -> RegistryResult<RegistryEntry> {
    let fields = doc
        .fields
        .as_ref()
        .ok_or_else(|| RegistryError::corrupt_entry("<unknown>", "document has no fields"))?;

    let get_string = |key: &str| -> Option<String> {
        field(fields, key).and_then(|v| String::from_firestore_value(&v))
    };

    let id = get_string("id").ok_or_else(|| RegistryError::corrupt_entry("<unknown>", "missing id"))?;
    let stream_id = get_string("stream_id")
        .ok_or_else(|| RegistryError::corrupt_entry(&id, "missing stream_id"))?;
    let barn_id =
        get_string("barn_id").ok_or_else(|| RegistryError::corrupt_entry(&id, "missing barn_id"))?;

    let bbox = match field(fields, "bbox") {
        Some(Value::MapValue(m)) => {
            let m = m.fields.unwrap_or_default();
            BoundingBox::new(
                f64::from_firestore_value(m.get("x").unwrap_or(&Value::DoubleValue(0.0))).unwrap_or(0.0),
                f64::from_firestore_value(m.get("y").unwrap_or(&Value::DoubleValue(0.0))).unwrap_or(0.0),
                f64::from_firestore_value(m.get("w").unwrap_or(&Value::DoubleValue(0.0))).unwrap_or(0.0),
                f64::from_firestore_value(m.get("h").unwrap_or(&Value::DoubleValue(0.0))).unwrap_or(0.0),
            )
        }
        _ => return Err(RegistryError::corrupt_entry(&id, "missing bbox")),
    };

    let features = match field(fields, "features") {
        Some(Value::ArrayValue(arr)) => arr
            .values
            .unwrap_or_default()
            .iter()
            .filter_map(f32::from_firestore_value)
            .collect(),
        _ => Vec::new(),
    };

    let last_updated_time = match field(fields, "last_updated_time") {
        Some(v) => DateTime::<Utc>::from_firestore_value(&v).unwrap_or_else(Utc::now),
        None => Utc::now(),
    };

    let status = match get_string("status").as_deref() {
        Some("archived") => RegistryStatus::Archived,
        _ => RegistryStatus::Active,
    };

    let thumbnail_bytes = match field(fields, "thumbnail_bytes") {
        Some(Value::BytesValue(b64)) => base64::engine::general_purpose::STANDARD.decode(b64).ok(),
        _ => None,
    };

    Ok(RegistryEntry {
        id: TrackId::new(id),
        stream_id: StreamId::new(stream_id),
        barn_id: BarnId::new(barn_id),
        name: get_string("name"),
        is_official: field(fields, "is_official")
            .and_then(|v| bool::from_firestore_value(&v))
            .unwrap_or(false),
        color_hex: get_string("color_hex").unwrap_or_default(),
        last_updated_time,
        bbox,
        confidence: field(fields, "confidence")
            .and_then(|v| f32::from_firestore_value(&v))
            .unwrap_or(0.0),
        features,
        total_detections: field(fields, "total_detections")
            .and_then(|v| u32::from_firestore_value(&v))
            .unwrap_or(0),
        tracking_confidence: field(fields, "tracking_confidence")
            .and_then(|v| f32::from_firestore_value(&v))
            .unwrap_or(0.0),
        status,
        thumbnail_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_and_normalize_is_unit_norm() {
        let new = vec![1.0, 0.0, 0.0];
        let old = vec![0.0, 1.0, 0.0];
        let blended = blend_and_normalize(&new, &old);
        let norm = blended.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn blend_with_empty_old_keeps_new() {
        let new = vec![1.0, 0.0];
        let old: Vec<f32> = vec![];
        assert_eq!(blend_and_normalize(&new, &old), new);
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = AppearanceEmbedding(vec![0.6, 0.8]);
        assert!((v.cosine_similarity(&v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shadow_with_hot_keeps_warm_name_and_official() {
        let now = Utc::now();
        let mut warm = RegistryEntry {
            id: TrackId::new("t1"),
            stream_id: StreamId::new("s1"),
            barn_id: BarnId::new("b1"),
            name: Some("Thunder".to_string()),
            is_official: true,
            color_hex: "#ff0000".to_string(),
            last_updated_time: now,
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            confidence: 0.5,
            features: vec![1.0],
            total_detections: 3,
            tracking_confidence: 0.5,
            status: RegistryStatus::Active,
            thumbnail_bytes: None,
        };
        let mut hot = warm.clone();
        hot.name = None;
        hot.is_official = false;
        hot.total_detections = 99;
        hot.bbox = BoundingBox::new(5.0, 5.0, 20.0, 20.0);

        shadow_with_hot(&mut warm, hot);

        assert_eq!(warm.name.as_deref(), Some("Thunder"));
        assert!(warm.is_official);
        assert_eq!(warm.total_detections, 99);
        assert_eq!(warm.bbox.x, 5.0);
    }
}
