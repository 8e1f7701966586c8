//! Reprocessing pipeline (§4.7): apply human corrections to an already
//! processed chunk, re-extract appearance features for the affected
//! identities, and rebuild the overlay video and JSON in place.

use std::collections::HashMap;
use std::path::Path;

use image::{imageops, RgbImage};
use tracing::warn;

use equinewatch_media::{encoder, fs_utils, make_thumbnail, render_overlay, FrameSource};
use equinewatch_models::{
    BoundingBox, ChunkRecord, Correction, CorrectionType, FrameRecord, Job, JobKind, JobStatus,
    RegistryEntry, RegistryStatus, StreamId, TrackId,
};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::pipeline::{summarize_horses, PipelineContext};

/// Padding applied around a detection's box before re-extracting its
/// appearance feature, matching the tracker's own convention for crops fed
/// to the inference service (§4.7 step 4).
const FEATURE_CROP_PAD_FRAC: f64 = 0.1;

/// Run the §4.7 procedure for one `ReprocessChunk` job end to end. `cancel`
/// is polled at each per-frame suspension point, matching `process_chunk`'s
/// cancellation contract (§5).
pub async fn reprocess_chunk(
    ctx: &PipelineContext,
    job: &Job,
    cancel: tokio::sync::watch::Receiver<bool>,
) -> WorkerResult<ChunkRecord> {
    let JobKind::ReprocessChunk { corrections } = &job.kind else {
        return Err(WorkerError::decode_error("reprocess_chunk called with a non-ReprocessChunk job"));
    };

    let logger = JobLogger::new(&job.id, "reprocessing");
    logger.log_start(&format!("chunk {} ({} corrections)", job.chunk_id, corrections.len()));

    if let Some(bad) = corrections.iter().find(|c| !c.is_well_formed()) {
        return Err(WorkerError::correction_invalid(format!(
            "correction at frame {} detection {} is missing a field {:?} requires",
            bad.frame_index, bad.detection_index, bad.correction_type
        )));
    }

    // §4.7 step 1: resolve the chunk's durable layout.
    let json_bytes = ctx.storage.download_chunk_json(&job.barn_id, &job.stream_id, &job.chunk_id).await?;
    let mut record: ChunkRecord = serde_json::from_slice(&json_bytes)?;

    let work_dir = tempfile::TempDir::new()?;
    let raw_path = work_dir.path().join("raw.mp4");
    ctx.storage.download_raw_chunk(&job.barn_id, &job.stream_id, &job.chunk_id, &raw_path).await?;

    let _ = ctx.progress.publish_progress(&job.id, 10, "applying corrections").await;

    // §4.7 steps 3 and 5: apply corrections to a copy, reattaching each
    // touched frame's keypoints/state entries to their new track id.
    let touched = apply_corrections(&mut record.frames, corrections, &job.stream_id)?;

    let _ = ctx.progress.publish_progress(&job.id, 30, "re-extracting features").await;

    // §4.7 step 4: re-extract appearance features from the raw frames for
    // every touched track, using its best remaining (highest-confidence)
    // detection, and blend the result into the warm tier via `save_barn`.
    let mut source = FrameSource::open(&raw_path, record.video_metadata.frame_interval).await?;
    let preliminary_stats = summarize_horses(&record.frames, &HashMap::new());
    let mut updated_entries: HashMap<TrackId, RegistryEntry> = HashMap::new();

    for (track_id, (frame_index, bbox, confidence)) in best_crop_per_track(&record.frames, &touched) {
        source.seek(frame_index)?;
        let frame = match source.next_frame()? {
            Some(f) => f,
            None => {
                warn!(track_id = %track_id, frame_index, "best crop frame missing from raw video, skipping re-extraction");
                continue;
            }
        };

        let crop = padded_square_crop(&frame.image, &bbox);
        let features = match ctx.inference.embed(&crop).await {
            Ok(Some(embedding)) => embedding.0,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(track_id = %track_id, "feature re-extraction failed, registry entry keeps its prior embedding: {e}");
                Vec::new()
            }
        };
        let thumbnail_bytes = make_thumbnail(&frame.image, &bbox).ok();

        let stats = preliminary_stats.iter().find(|h| h.track_id == track_id.as_str());
        let total_detections = stats.map(|s| s.total_detections).unwrap_or(0);
        let name = stats.and_then(|s| s.name.clone());
        let is_official = stats.map(|s| s.is_official).unwrap_or(false);

        updated_entries.insert(
            track_id.clone(),
            RegistryEntry {
                id: track_id,
                stream_id: job.stream_id.clone(),
                barn_id: job.barn_id.clone(),
                name,
                is_official,
                color_hex: equinewatch_models::color_for_label(0).to_hex(),
                last_updated_time: chrono::Utc::now(),
                bbox,
                confidence,
                features,
                total_detections,
                tracking_confidence: confidence,
                status: RegistryStatus::Active,
                thumbnail_bytes,
            },
        );
    }

    if !updated_entries.is_empty() {
        if let Err(e) = ctx.registry.save_barn(&job.barn_id, &updated_entries).await {
            logger.log_warning(&format!("registry save_barn failed for reprocessed tracks: {e}"));
        }
    }

    let official: HashMap<String, bool> = preliminary_stats
        .iter()
        .map(|h| (h.track_id.clone(), updated_entries.get(&TrackId::new(h.track_id.clone())).map(|e| e.is_official).unwrap_or(h.is_official)))
        .collect();
    record.horses = summarize_horses(&record.frames, &official);
    record.summary.total_horses = record.horses.len() as u32;

    let _ = ctx.progress.publish_progress(&job.id, 55, "rendering").await;

    // §4.7 step 5: regenerate every frame's overlay from the corrected
    // tracked/keypoints/state data.
    source.seek(0)?;
    let frame_dir = tempfile::TempDir::new()?;
    for frame_record in &record.frames {
        if *cancel.borrow() {
            warn!(chunk_id = %job.chunk_id, "cancellation signal received, discarding partial reprocess output");
            return Err(WorkerError::cancelled());
        }

        let decoded = match source.next_frame()? {
            Some(f) => f,
            None => break,
        };
        let mut image = decoded.image;
        render_overlay(&mut image, frame_record, ctx.font.as_ref());
        let frame_path = encoder::rendered_frame_path(frame_dir.path(), frame_record.frame_index);
        image.save(&frame_path).map_err(equinewatch_media::MediaError::Image)?;
    }

    // §4.7 step 6: rebuild preserving the original stride-derived duration.
    let encoded_path = work_dir.path().join("overlay_rebuilt.mp4");
    encoder::rebuild_video(frame_dir.path(), &encoded_path, record.video_metadata.fps, record.video_metadata.frame_interval)
        .await?;

    let final_video_path = work_dir.path().join("overlay.mp4");
    fs_utils::move_file(&encoded_path, &final_video_path).await?;

    let _ = ctx.progress.publish_progress(&job.id, 85, "persisting").await;

    // §4.7 step 7: persist both outputs durably.
    ctx.storage.upload_chunk_video(&final_video_path, &job.barn_id, &job.stream_id, &job.chunk_id).await?;
    let json_bytes = serde_json::to_vec_pretty(&record)?;
    ctx.storage.upload_chunk_json(json_bytes, &job.barn_id, &job.stream_id, &job.chunk_id).await?;

    let _ = ctx.progress.publish_progress(&job.id, 100, "complete").await;
    let _ = ctx.progress.publish_terminal(&job.id, JobStatus::Completed, None).await;
    logger.log_completion(&format!("chunk {} reprocessed, {} tracks touched", job.chunk_id, touched.len()));

    Ok(record)
}

/// Apply each correction to its `(frame_index, detection_index)` slot,
/// returning the set of track ids the batch touched. Reassign/new-guest
/// corrections also move that frame's keypoints/state entry to the new
/// track id key (§4.7 step 5); new-guest ids are deduplicated by name
/// within the batch so repeated corrections for the same guest land on one
/// track.
fn apply_corrections(
    frames: &mut [FrameRecord],
    corrections: &[Correction],
    stream_id: &StreamId,
) -> WorkerResult<std::collections::HashSet<TrackId>> {
    let mut touched = std::collections::HashSet::new();
    let mut new_guest_ids: HashMap<String, TrackId> = HashMap::new();
    let mut removals: Vec<(usize, usize)> = Vec::new();

    for correction in corrections {
        let frame_idx = frames
            .iter()
            .position(|f| f.frame_index == correction.frame_index)
            .ok_or_else(|| WorkerError::correction_invalid(format!("no frame with index {}", correction.frame_index)))?;
        let frame = &mut frames[frame_idx];
        if correction.detection_index >= frame.tracked.len() {
            return Err(WorkerError::correction_invalid(format!(
                "frame {} has no detection at index {}",
                correction.frame_index, correction.detection_index
            )));
        }

        match correction.correction_type {
            CorrectionType::Reassign => {
                let new_id = TrackId::new(correction.corrected_horse_id.clone().unwrap());
                reattach(frame, correction.detection_index, &new_id, None);
                touched.insert(new_id);
            }
            CorrectionType::NewGuest => {
                let name = correction.corrected_horse_name.clone().unwrap();
                let new_id = new_guest_ids
                    .entry(name.clone())
                    .or_insert_with(|| {
                        let sanitized_stream = stream_id.as_str().replace('-', "_");
                        let guest_uuid = uuid::Uuid::new_v4().to_string();
                        TrackId::new(format!("{sanitized_stream}_guest_{}", &guest_uuid[..8]))
                    })
                    .clone();
                reattach(frame, correction.detection_index, &new_id, Some(name));
                touched.insert(new_id);
            }
            CorrectionType::MarkIncorrect => {
                removals.push((frame_idx, correction.detection_index));
            }
        }
    }

    // Remove highest index first per frame so earlier indices stay valid.
    removals.sort_by(|a, b| b.1.cmp(&a.1));
    for (frame_idx, detection_idx) in removals {
        let frame = &mut frames[frame_idx];
        let removed = frame.tracked.remove(detection_idx);
        let key = removed.track_id.to_string();
        frame.keypoints.remove(&key);
        frame.state_label.remove(&key);
    }

    Ok(touched)
}

/// Reassign `frame.tracked[index]` to `new_id`, carrying its per-frame
/// keypoints/state entry over to the new key.
fn reattach(frame: &mut FrameRecord, index: usize, new_id: &TrackId, name: Option<String>) {
    let old_key = frame.tracked[index].track_id.to_string();
    let new_key = new_id.to_string();

    frame.tracked[index].track_id = new_id.clone();
    if name.is_some() {
        frame.tracked[index].horse_name = name;
    }

    if old_key != new_key {
        if let Some(kp) = frame.keypoints.remove(&old_key) {
            frame.keypoints.insert(new_key.clone(), kp);
        }
        if let Some(state) = frame.state_label.remove(&old_key) {
            frame.state_label.insert(new_key, state);
        }
    }
}

/// For each touched track, the `(frame_index, bbox, confidence)` of its
/// highest-confidence remaining detection (§4.7 step 4 "best-quality crop").
fn best_crop_per_track(
    frames: &[FrameRecord],
    touched: &std::collections::HashSet<TrackId>,
) -> Vec<(TrackId, (u64, BoundingBox, f32))> {
    let mut best: HashMap<TrackId, (u64, BoundingBox, f32)> = HashMap::new();
    for frame in frames {
        for entry in &frame.tracked {
            if !touched.contains(&entry.track_id) {
                continue;
            }
            match best.get(&entry.track_id) {
                Some((_, _, conf)) if *conf >= entry.confidence => {}
                _ => {
                    best.insert(entry.track_id.clone(), (frame.frame_index, entry.bbox, entry.confidence));
                }
            }
        }
    }
    best.into_iter().collect()
}

/// Crop `bbox` padded to a square (§4.7 step 4), black-padding any region
/// that falls outside `frame`'s bounds rather than clamping it away.
fn padded_square_crop(frame: &RgbImage, bbox: &BoundingBox) -> RgbImage {
    let padded = bbox.padded_square(FEATURE_CROP_PAD_FRAC);
    let side = padded.w.round().max(1.0) as u32;
    let mut canvas = RgbImage::new(side, side);

    let (fw, fh) = (frame.width() as f64, frame.height() as f64);
    let ix0 = padded.x.max(0.0);
    let iy0 = padded.y.max(0.0);
    let ix1 = (padded.x + padded.w).min(fw);
    let iy1 = (padded.y + padded.h).min(fh);

    if ix1 > ix0 && iy1 > iy0 {
        let crop = imageops::crop_imm(frame, ix0.round() as u32, iy0.round() as u32, (ix1 - ix0).round() as u32, (iy1 - iy0).round() as u32)
            .to_image();
        let offset_x = (ix0 - padded.x).round() as i64;
        let offset_y = (iy0 - padded.y).round() as i64;
        imageops::overlay(&mut canvas, &crop, offset_x, offset_y);
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use equinewatch_models::{Rgb, TrackState, TrackedEntry};

    fn frame_with_entry(index: u64, track_id: &str, conf: f32) -> FrameRecord {
        let mut f = FrameRecord::placeholder(index, index as f64);
        f.tracked.push(TrackedEntry {
            track_id: TrackId::new(track_id),
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            confidence: conf,
            color: Rgb(0, 0, 0),
            state: TrackState::Active,
            is_new: false,
            horse_name: None,
        });
        f
    }

    #[test]
    fn reassign_moves_keypoints_to_new_key() {
        let mut frame = frame_with_entry(0, "t1", 0.5);
        let kp = equinewatch_models::Keypoints([equinewatch_models::Keypoint { x: 0.0, y: 0.0, conf: 0.0 }; 17]);
        frame.keypoints.insert("t1".to_string(), kp);
        reattach(&mut frame, 0, &TrackId::new("t2"), None);
        assert_eq!(frame.tracked[0].track_id.to_string(), "t2");
        assert!(frame.keypoints.contains_key("t2"));
        assert!(!frame.keypoints.contains_key("t1"));
    }

    #[test]
    fn apply_corrections_rejects_out_of_range_detection() {
        let mut frames = vec![frame_with_entry(0, "t1", 0.5)];
        let corrections = vec![Correction {
            frame_index: 0,
            detection_index: 5,
            correction_type: CorrectionType::MarkIncorrect,
            original_horse_id: "t1".to_string(),
            corrected_horse_id: None,
            corrected_horse_name: None,
        }];
        let stream_id = StreamId::new("s1");
        assert!(apply_corrections(&mut frames, &corrections, &stream_id).is_err());
    }

    #[test]
    fn mark_incorrect_removes_detection() {
        let mut frames = vec![frame_with_entry(0, "t1", 0.5)];
        let corrections = vec![Correction {
            frame_index: 0,
            detection_index: 0,
            correction_type: CorrectionType::MarkIncorrect,
            original_horse_id: "t1".to_string(),
            corrected_horse_id: None,
            corrected_horse_name: None,
        }];
        let stream_id = StreamId::new("s1");
        apply_corrections(&mut frames, &corrections, &stream_id).unwrap();
        assert!(frames[0].tracked.is_empty());
    }

    #[test]
    fn best_crop_per_track_picks_highest_confidence() {
        let frames = vec![frame_with_entry(0, "t1", 0.3), frame_with_entry(1, "t1", 0.9)];
        let mut touched = std::collections::HashSet::new();
        touched.insert(TrackId::new("t1"));
        let best = best_crop_per_track(&frames, &touched);
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].1 .0, 1);
    }
}
