//! Multi-object tracking of lidar obstacle detections.
//!
//! Detections from each sweep are associated to existing tracks with a
//! weighted distance and per-component Hungarian assignment, then smoothed
//! with a constant-velocity Kalman filter.

pub mod integration;
pub mod tracker;

pub use integration::{DetectionBuilder, DetectionSource, SensorFrame, TrackerPipeline};
pub use tracker::{Detection, ObjectTracker, TrackedObject, TrackerConfig, TrackerOptions};
