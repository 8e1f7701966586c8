#![deny(unreachable_patterns)]
//! Frame decoding, overlay rendering, and video re-encoding for the
//! chunk-processing pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and execution with progress
//!   parsing and cancellation support
//! - Chunk decode into a seek-capable, strided frame sequence (§4.1)
//! - Deterministic bounding-box/skeleton overlay rendering (§4.5)
//! - Stride-preserving video rebuild after annotation (§4.7, §4.9)
//! - In-memory thumbnail cropping for registry entries (§4.7)

pub mod command;
pub mod encoder;
pub mod error;
pub mod frame_source;
pub mod fs_utils;
pub mod overlay;
pub mod probe;
pub mod progress;
pub mod thumbnail;

pub use command::{FfmpegCommand, FfmpegRunner};
pub use encoder::{rebuild_video, rendered_frame_path};
pub use error::{MediaError, MediaResult};
pub use frame_source::{Frame, FrameSource};
pub use fs_utils::move_file;
pub use overlay::render_overlay;
pub use probe::{probe_video, VideoInfo};
pub use progress::{FfmpegProgress, ProgressCallback};
pub use thumbnail::make_thumbnail;
