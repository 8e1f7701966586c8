//! Multi-target tracker and coarse body-state annotator for the
//! horse-monitoring chunk pipeline.
//!
//! This crate implements the per-chunk, in-memory half of the pipeline:
//! two-stage (IoU then appearance) track association with a lost-track
//! revival window (§4.2), and hysteresis-smoothed body-state labeling
//! (§4.4). It knows nothing about storage, queues, or video I/O; the worker
//! crate wires it to the warm/hot registry and the frame source.

pub mod assignment;
pub mod extractor;
pub mod state_annotator;
pub mod tracker;

pub use assignment::min_cost_assignment;
pub use extractor::{FeatureExtractor, NullExtractor};
pub use state_annotator::StateAnnotator;
pub use tracker::{FrameUpdate, Tracker, TrackerConfig};
