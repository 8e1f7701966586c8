//! Stride-preserving video rebuild (§4.7 step 6, §4.9, §6).
//!
//! The tracker operates on a strided frame sequence (every Nth source
//! frame). Rebuilding the output video must read that sequence back in
//! at `source_fps / frame_interval` and write it out at `source_fps`,
//! so a `frame_interval`-stride chunk plays back at its original
//! wall-clock duration with the intervening frames simply missing
//! their overlay. Output is H.264/yuv420p at CRF 23 (§6).

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

const OUTPUT_CRF: u8 = 23;
const OUTPUT_PRESET: &str = "medium";

/// Rebuild a video from a directory of sequentially-numbered rendered
/// frame images (`frame-%08d.png`, matching `FrameSource`'s decode
/// layout), restoring the original frame rate.
pub async fn rebuild_video(
    frame_dir: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    source_fps: f64,
    frame_interval: u32,
) -> MediaResult<()> {
    let frame_interval = frame_interval.max(1);
    let strided_fps = source_fps / frame_interval as f64;
    let pattern = frame_dir.as_ref().join("frame-%08d.png");

    debug!(
        strided_fps,
        source_fps, frame_interval, "rebuilding video from rendered frames"
    );

    let cmd = FfmpegCommand::new(&pattern, output_path.as_ref())
        .image_sequence_pattern()
        .input_framerate(strided_fps)
        .video_codec("libx264")
        .pixel_format("yuv420p")
        .crf(OUTPUT_CRF)
        .preset(OUTPUT_PRESET)
        .output_framerate(source_fps);

    FfmpegRunner::new().run(&cmd).await
}

/// Path within `frame_dir` that a frame at `index` should be written to
/// so `rebuild_video`'s glob pattern picks it up in order.
pub fn rendered_frame_path(frame_dir: impl AsRef<Path>, index: u64) -> PathBuf {
    frame_dir.as_ref().join(format!("frame-{:08}.png", index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_frame_path_is_zero_padded() {
        let path = rendered_frame_path("/tmp/frames", 7);
        assert_eq!(path.file_name().unwrap(), "frame-00000007.png");
    }
}
