//! Glue for driving an [`ObjectTracker`](crate::tracker::ObjectTracker) from
//! an upstream segmentation stage.
//!
//! Segmenters implement [`DetectionSource`] and hand out one
//! [`SensorFrame`] per sweep; [`TrackerPipeline`] feeds those frames to the
//! tracker in order.

mod builder;
mod detector;
mod pipeline;

pub use builder::DetectionBuilder;
pub use detector::{DetectionSource, IntoDetections, SensorFrame};
pub use pipeline::{PipelineError, TrackerPipeline};
