//! Chunk decode and seek-capable frame iteration (§4.1).
//!
//! A chunk is decoded once into a directory of PNG frames at the
//! requested stride, then read back lazily. This keeps the frame
//! contract ("open once, iterate frames 0..N in monotonic order")
//! simple without holding the whole chunk in memory at once.

use std::path::{Path, PathBuf};

use image::RgbImage;
use tempfile::TempDir;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, VideoInfo};

/// A single decoded frame and its position in the original chunk.
pub struct Frame {
    /// Index into the strided sequence (0-based, monotonic).
    pub index: u64,
    /// Timestamp within the chunk, in seconds.
    pub timestamp_s: f64,
    pub image: RgbImage,
}

/// An opened chunk: decodes to a temp directory of frame images on
/// `open`, then yields them lazily via `next_frame`.
pub struct FrameSource {
    _decode_dir: TempDir,
    frame_paths: Vec<PathBuf>,
    cursor: usize,
    pub info: VideoInfo,
    pub frame_interval: u32,
}

impl FrameSource {
    /// Decode `path` at the given stride (`frame_interval`: keep every
    /// Nth source frame) into a private temp directory, and prepare to
    /// iterate the resulting frames in order (§4.1).
    pub async fn open(path: impl AsRef<Path>, frame_interval: u32) -> MediaResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let info = probe_video(path).await?;
        let frame_interval = frame_interval.max(1);

        let decode_dir = TempDir::new().map_err(MediaError::Io)?;
        let pattern = decode_dir.path().join("frame-%08d.png");

        let select = format!("select='not(mod(n\\,{}))'", frame_interval);
        let cmd = FfmpegCommand::new(path, &pattern)
            .video_filter(&select)
            .output_arg("-vsync")
            .output_arg("vfr");

        debug!(chunk = %path.display(), frame_interval, "decoding chunk to frame sequence");
        FfmpegRunner::new().run(&cmd).await?;

        let mut frame_paths: Vec<PathBuf> = std::fs::read_dir(decode_dir.path())
            .map_err(MediaError::Io)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "png").unwrap_or(false))
            .collect();
        frame_paths.sort();

        Ok(Self {
            _decode_dir: decode_dir,
            frame_paths,
            cursor: 0,
            info,
            frame_interval,
        })
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_paths.len() as u64
    }

    /// Effective fps of the strided sequence (`source_fps / frame_interval`, §4.9).
    pub fn strided_fps(&self) -> f64 {
        self.info.fps / self.frame_interval as f64
    }

    /// Read the next frame in monotonic order, or `None` at end of chunk.
    pub fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.cursor >= self.frame_paths.len() {
            return Ok(None);
        }

        let path = &self.frame_paths[self.cursor];
        let image = image::open(path)
            .map_err(MediaError::Image)?
            .into_rgb8();

        let index = self.cursor as u64;
        let timestamp_s = index as f64 / self.strided_fps();
        self.cursor += 1;

        Ok(Some(Frame {
            index,
            timestamp_s,
            image,
        }))
    }

    /// Seek to a specific strided-frame index without decoding past it.
    pub fn seek(&mut self, index: u64) -> MediaResult<()> {
        if index >= self.frame_paths.len() as u64 {
            return Err(MediaError::FrameOutOfRange(index));
        }
        self.cursor = index as usize;
        Ok(())
    }
}

impl Iterator for FrameSource {
    type Item = MediaResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}
