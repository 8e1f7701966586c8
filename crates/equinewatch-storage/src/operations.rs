//! High-level chunk storage operations (§4.7, §4.9).
//!
//! Keys are laid out per barn/stream/chunk so the reprocessor's
//! filesystem-layout resolution (§4.7 step 1) has a durable mirror:
//! `{barn_id}/{stream_id}/chunks/{chunk_id}/{raw.mp4,overlay.mp4,detections.json}`
//! and thumbnails under `{barn_id}/{stream_id}/thumbnails/{track_id}.jpg`.

use std::path::Path;

use equinewatch_models::{BarnId, ChunkId, StreamId, TrackId};

use crate::client::R2Client;
use crate::error::StorageResult;

fn chunk_prefix(barn_id: &BarnId, stream_id: &StreamId, chunk_id: &ChunkId) -> String {
    format!("{}/{}/chunks/{}", barn_id, stream_id, chunk_id)
}

impl R2Client {
    /// Upload the rendered overlay video for a chunk.
    pub async fn upload_chunk_video(
        &self,
        path: impl AsRef<Path>,
        barn_id: &BarnId,
        stream_id: &StreamId,
        chunk_id: &ChunkId,
    ) -> StorageResult<String> {
        let key = format!("{}/overlay.mp4", chunk_prefix(barn_id, stream_id, chunk_id));
        self.upload_file(path, &key, "video/mp4").await?;
        Ok(key)
    }

    /// Upload the raw (pre-annotation) chunk video.
    pub async fn upload_raw_chunk(
        &self,
        path: impl AsRef<Path>,
        barn_id: &BarnId,
        stream_id: &StreamId,
        chunk_id: &ChunkId,
    ) -> StorageResult<String> {
        let key = format!("{}/raw.mp4", chunk_prefix(barn_id, stream_id, chunk_id));
        self.upload_file(path, &key, "video/mp4").await?;
        Ok(key)
    }

    /// Download the raw chunk video to a local path, for reprocessing
    /// (§4.7 step 1).
    pub async fn download_raw_chunk(
        &self,
        barn_id: &BarnId,
        stream_id: &StreamId,
        chunk_id: &ChunkId,
        dest: impl AsRef<Path>,
    ) -> StorageResult<()> {
        let key = format!("{}/raw.mp4", chunk_prefix(barn_id, stream_id, chunk_id));
        self.download_file(&key, dest).await
    }

    /// Upload the per-chunk detections/tracks JSON summary.
    pub async fn upload_chunk_json(
        &self,
        json_bytes: Vec<u8>,
        barn_id: &BarnId,
        stream_id: &StreamId,
        chunk_id: &ChunkId,
    ) -> StorageResult<String> {
        let key = format!("{}/detections.json", chunk_prefix(barn_id, stream_id, chunk_id));
        self.upload_bytes(json_bytes, &key, "application/json").await?;
        Ok(key)
    }

    /// Download the per-chunk detections/tracks JSON summary.
    pub async fn download_chunk_json(
        &self,
        barn_id: &BarnId,
        stream_id: &StreamId,
        chunk_id: &ChunkId,
    ) -> StorageResult<Vec<u8>> {
        let key = format!("{}/detections.json", chunk_prefix(barn_id, stream_id, chunk_id));
        self.download_bytes(&key).await
    }

    /// Upload a registry entry's thumbnail crop (§4.7 step 4).
    pub async fn upload_thumbnail(
        &self,
        jpeg_bytes: Vec<u8>,
        barn_id: &BarnId,
        stream_id: &StreamId,
        track_id: &TrackId,
    ) -> StorageResult<String> {
        let key = format!("{}/{}/thumbnails/{}.jpg", barn_id, stream_id, track_id);
        self.upload_bytes(jpeg_bytes, &key, "image/jpeg").await?;
        Ok(key)
    }

    /// Delete all durable objects for a chunk (overlay, raw, json).
    pub async fn delete_chunk_files(
        &self,
        barn_id: &BarnId,
        stream_id: &StreamId,
        chunk_id: &ChunkId,
    ) -> StorageResult<u32> {
        let prefix = chunk_prefix(barn_id, stream_id, chunk_id);
        let objects = self.list_objects(&prefix).await?;
        if objects.is_empty() {
            return Ok(0);
        }
        let keys: Vec<_> = objects.into_iter().map(|o| o.key).collect();
        self.delete_objects(&keys).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_prefix_is_barn_stream_chunk_scoped() {
        let barn = BarnId::new("barn-1");
        let stream = StreamId::new("stream-1");
        let chunk = ChunkId::new("chunk-1");
        assert_eq!(chunk_prefix(&barn, &stream, &chunk), "barn-1/stream-1/chunks/chunk-1");
    }
}
