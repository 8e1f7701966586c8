//! Chunk processing pipeline (§4.1, §4.2, §4.4, §4.5, §4.6, §4.9): decode a
//! chunk at its configured stride, track and annotate every frame, render
//! the overlay, rebuild the video, and assemble the persisted `ChunkRecord`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tracing::warn;

use equinewatch_inference::InferenceClient;
use equinewatch_media::{encoder, render_overlay, FrameSource, MediaError};
use equinewatch_models::{
    BodyState, ChunkRecord, ChunkSummary, FrameRecord, HorseSummary, Job, JobKind, JobStatus,
    TrackId, VideoMetadata,
};
use equinewatch_queue::ProgressChannel;
use equinewatch_registry::IdentityRegistry;
use equinewatch_storage::R2Client;
use equinewatch_tracker::{StateAnnotator, Tracker, TrackerConfig};

use crate::error::{WorkerError, WorkerResult};
use crate::extractor::RemoteExtractor;
use crate::logging::JobLogger;

/// Keypoints are estimated for only every Nth frame, bounding inference load
/// for a cost the tracker's per-track appearance re-identification doesn't
/// otherwise pay (§3 `keypoints`: "present only for a configurable subsample").
const KEYPOINT_SAMPLE_INTERVAL: u64 = 5;

/// The collaborators `process_chunk` and `reprocessor::reprocess_chunk`
/// share: the concrete inference backend, the identity registry, and the
/// progress channel back to the scheduler.
pub struct PipelineContext {
    pub registry: IdentityRegistry,
    pub extractor: RemoteExtractor,
    pub inference: InferenceClient,
    pub progress: ProgressChannel,
    pub storage: R2Client,
    pub font: Option<rusttype::Font<'static>>,
}

/// Run the §4.1-§4.6/§4.9 procedure for one `ProcessChunk` job end to end.
/// `cancel` is polled at each per-frame suspension point (§5): once it
/// reports a shutdown in progress, the loop stops and the job fails with
/// `WorkerError::Cancelled` before any further output is written.
pub async fn process_chunk(
    ctx: &PipelineContext,
    job: &Job,
    cancel: tokio::sync::watch::Receiver<bool>,
) -> WorkerResult<ChunkRecord> {
    let JobKind::ProcessChunk { chunk_path, output_video_path, output_json_path, frame_interval, options, .. } =
        &job.kind
    else {
        return Err(WorkerError::decode_error("process_chunk called with a non-ProcessChunk job"));
    };

    let logger = JobLogger::new(&job.id, "chunk_processing");
    logger.log_start(&format!("chunk {} ({})", job.chunk_id, chunk_path));

    let mut source = FrameSource::open(chunk_path, *frame_interval).await.map_err(|e| match e {
        MediaError::FileNotFound(p) => WorkerError::input_not_found(p.display().to_string()),
        other => WorkerError::Media(other),
    })?;

    let frame_count = source.frame_count();
    let source_fps = source.info.fps;
    let strided_fps = source.strided_fps();

    let seed_entries = match ctx.registry.load_barn(&job.barn_id, std::slice::from_ref(&job.stream_id)).await {
        Ok(entries) => entries,
        Err(e) => {
            logger.log_warning(&format!("registry unavailable, starting this chunk's tracks cold: {e}"));
            HashMap::new()
        }
    };

    let mut tracker = Tracker::new(TrackerConfig::from(options));
    tracker.seed(seed_entries);
    let mut annotator = StateAnnotator::new();

    let frame_dir = tempfile::TempDir::new()?;
    let mut frames: Vec<FrameRecord> = Vec::with_capacity(frame_count as usize);

    loop {
        if *cancel.borrow() {
            warn!(chunk_id = %job.chunk_id, "cancellation signal received, discarding partial chunk output");
            return Err(WorkerError::cancelled());
        }

        let next = match source.next_frame() {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => {
                warn!(chunk_id = %job.chunk_id, "decode error mid-chunk, remaining frames marked unprocessed: {e}");
                break;
            }
        };

        let detections = match ctx.inference.detect(&next.image, options.detection_threshold).await {
            Ok(d) => d,
            Err(e) => {
                warn!(chunk_id = %job.chunk_id, frame = next.index, "detection request failed, frame has no tracks: {e}");
                Vec::new()
            }
        };

        let update = tracker
            .process_frame(&detections, next.index, next.timestamp_s, &next.image, &ctx.extractor)
            .await;

        let mut record = FrameRecord::placeholder(next.index, next.timestamp_s);
        record.processed = true;

        let sample_keypoints = next.index % KEYPOINT_SAMPLE_INTERVAL == 0;
        let mut labels: BTreeMap<String, BodyState> = BTreeMap::new();
        let mut keypoints_by_track = BTreeMap::new();
        for entry in &update.tracked {
            let track_key = entry.track_id.to_string();
            let keypoints = if sample_keypoints { ctx.extractor.keypoints(&next.image, &entry.bbox).await } else { None };
            let state = annotator.annotate(&track_key, keypoints.as_ref(), &entry.bbox);
            labels.insert(track_key.clone(), state);
            if let Some(kp) = keypoints {
                keypoints_by_track.insert(track_key, kp);
            }
        }
        record.state_label = labels;
        record.keypoints = keypoints_by_track;
        record.tracked = update.tracked;

        let mut image = next.image;
        render_overlay(&mut image, &record, ctx.font.as_ref());
        let frame_path = encoder::rendered_frame_path(frame_dir.path(), next.index);
        image.save(&frame_path).map_err(MediaError::Image)?;

        frames.push(record);

        if frame_count > 0 && next.index % 30 == 0 {
            let percent = ((next.index as f64 / frame_count as f64) * 85.0) as u8;
            let _ = ctx.progress.publish_progress(&job.id, percent.min(85), "tracking").await;
        }
    }

    // §7 `DecodeError`: any frame the loop above didn't reach stays a
    // placeholder, so the chunk still completes with partial output.
    for idx in (frames.len() as u64)..frame_count {
        frames.push(FrameRecord::placeholder(idx, idx as f64 / strided_fps));
    }

    let _ = ctx.progress.publish_progress(&job.id, 90, "rendering").await;

    if let Some(parent) = Path::new(output_video_path.as_str()).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    encoder::rebuild_video(frame_dir.path(), output_video_path, source_fps, *frame_interval).await?;

    if let Err(e) = ctx.storage.upload_raw_chunk(chunk_path, &job.barn_id, &job.stream_id, &job.chunk_id).await {
        logger.log_warning(&format!("raw chunk upload failed, reprocessing won't find this chunk durably: {e}"));
    }
    if let Err(e) = ctx.storage.upload_chunk_video(output_video_path, &job.barn_id, &job.stream_id, &job.chunk_id).await {
        logger.log_warning(&format!("overlay video upload failed: {e}"));
    }

    let snapshot = tracker.snapshot(&job.stream_id, &job.barn_id);
    if let Err(e) = ctx.registry.save_barn(&job.barn_id, &snapshot).await {
        logger.log_warning(&format!("registry save_barn failed, in-memory identities won't persist past this chunk: {e}"));
    }

    let official: HashMap<String, bool> = snapshot.iter().map(|(id, e)| (id.to_string(), e.is_official)).collect();
    let horses = summarize_horses(&frames, &official);
    let summary = ChunkSummary {
        total_horses: horses.len() as u32,
        active_at_end: tracker.active_count(),
        new_tracks_created: tracker.total_new_tracks(),
        revived_tracks: tracker.total_revived(),
    };

    let record = ChunkRecord {
        chunk_id: job.chunk_id.clone(),
        stream_id: job.stream_id.clone(),
        barn_id: job.barn_id.clone(),
        duration_s: frame_count as f64 / strided_fps,
        fps: source_fps,
        processing_fps: strided_fps,
        frame_count,
        processed_at: chrono::Utc::now(),
        frames,
        horses,
        summary,
        video_metadata: VideoMetadata { fps: source_fps, frame_interval: *frame_interval },
    };

    let json_bytes = serde_json::to_vec_pretty(&record)?;
    if let Some(parent) = Path::new(output_json_path.as_str()).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(output_json_path, &json_bytes).await?;
    if let Err(e) = ctx.storage.upload_chunk_json(json_bytes, &job.barn_id, &job.stream_id, &job.chunk_id).await {
        logger.log_warning(&format!("detections JSON upload failed: {e}"));
    }

    let _ = ctx.progress.publish_progress(&job.id, 100, "complete").await;
    let _ = ctx.progress.publish_terminal(&job.id, JobStatus::Completed, None).await;
    logger.log_completion(&format!("chunk {}: {} frames, {} horses", job.chunk_id, record.frame_count, record.horses.len()));

    Ok(record)
}

#[derive(Default)]
struct HorseAgg {
    first_frame: u64,
    last_frame: u64,
    total_detections: u32,
    confidence_sum: f64,
    name: Option<String>,
}

/// Build `ChunkRecord.horses` (§3) from the frame-level tracked entries,
/// folding in `is_official` keyed by track id string (from a registry
/// snapshot in first-pass processing, or a preserved/updated map when
/// reprocessing).
pub(crate) fn summarize_horses(frames: &[FrameRecord], official: &HashMap<String, bool>) -> Vec<HorseSummary> {
    let mut by_track: HashMap<String, HorseAgg> = HashMap::new();

    for frame in frames {
        for entry in &frame.tracked {
            let key = entry.track_id.to_string();
            let agg = by_track.entry(key).or_insert_with(|| HorseAgg {
                first_frame: frame.frame_index,
                last_frame: frame.frame_index,
                ..Default::default()
            });
            agg.first_frame = agg.first_frame.min(frame.frame_index);
            agg.last_frame = agg.last_frame.max(frame.frame_index);
            agg.total_detections += 1;
            agg.confidence_sum += entry.confidence as f64;
            if agg.name.is_none() {
                agg.name = entry.horse_name.clone();
            }
        }
    }

    let mut horses: Vec<HorseSummary> = by_track
        .into_iter()
        .map(|(track_id, agg)| {
            let is_official = official.get(&track_id).copied().unwrap_or(false);
            HorseSummary {
                track_id,
                first_frame: agg.first_frame,
                last_frame: agg.last_frame,
                total_detections: agg.total_detections,
                mean_confidence: if agg.total_detections > 0 {
                    (agg.confidence_sum / agg.total_detections as f64) as f32
                } else {
                    0.0
                },
                name: agg.name,
                is_official,
            }
        })
        .collect();

    // §8 reprocess idempotence requires byte-identical JSON across runs;
    // `by_track` iterates in HashMap order, so the output must be sorted.
    horses.sort_by(|a, b| a.track_id.cmp(&b.track_id));
    horses
}

#[cfg(test)]
mod tests {
    use super::*;
    use equinewatch_models::{BoundingBox, TrackState, TrackedEntry};

    fn entry(track_id: &str, conf: f32, name: Option<&str>) -> TrackedEntry {
        TrackedEntry {
            track_id: TrackId::new(track_id),
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            confidence: conf,
            color: equinewatch_models::color_for_label(0),
            state: TrackState::Active,
            is_new: false,
            horse_name: name.map(|s| s.to_string()),
        }
    }

    #[test]
    fn summarize_horses_aggregates_across_frames() {
        let mut f0 = FrameRecord::placeholder(0, 0.0);
        f0.tracked.push(entry("t1", 0.8, Some("Star")));
        let mut f1 = FrameRecord::placeholder(1, 1.0);
        f1.tracked.push(entry("t1", 0.6, None));

        let horses = summarize_horses(&[f0, f1], &HashMap::new());
        assert_eq!(horses.len(), 1);
        let h = &horses[0];
        assert_eq!(h.track_id, "t1");
        assert_eq!(h.first_frame, 0);
        assert_eq!(h.last_frame, 1);
        assert_eq!(h.total_detections, 2);
        assert!((h.mean_confidence - 0.7).abs() < 1e-5);
        assert_eq!(h.name.as_deref(), Some("Star"));
    }

    #[test]
    fn summarize_horses_empty_for_no_tracks() {
        let f0 = FrameRecord::placeholder(0, 0.0);
        assert!(summarize_horses(&[f0], &HashMap::new()).is_empty());
    }
}
