//! Trait for upstream segmentation stages producing lidar detections.

use nalgebra::Matrix4;

use crate::tracker::Detection;

/// Segmented objects of one lidar sweep together with where the sensor was.
#[derive(Debug, Clone)]
pub struct SensorFrame {
    pub detections: Vec<Detection>,
    /// Sweep time in seconds.
    pub timestamp: f64,
    /// Sensor-to-world pose; frames without one are rejected by the tracker.
    pub sensor_to_world: Option<Matrix4<f64>>,
}

impl SensorFrame {
    pub fn new(
        detections: impl IntoDetections,
        timestamp: f64,
        sensor_to_world: Matrix4<f64>,
    ) -> Self {
        Self {
            detections: detections.into_detections(),
            timestamp,
            sensor_to_world: Some(sensor_to_world),
        }
    }
}

/// A stream of segmented lidar sweeps.
///
/// # Example
///
/// ```ignore
/// use lidartrack_rs::{DetectionSource, SensorFrame};
///
/// struct Replay {
///     frames: std::vec::IntoIter<SensorFrame>,
/// }
///
/// impl DetectionSource for Replay {
///     type Error = std::convert::Infallible;
///
///     fn next_frame(&mut self) -> Result<Option<SensorFrame>, Self::Error> {
///         Ok(self.frames.next())
///     }
/// }
/// ```
pub trait DetectionSource {
    type Error;

    /// Next sweep, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<SensorFrame>, Self::Error>;
}

/// Conversion from a segmenter's native output into detections.
pub trait IntoDetections {
    fn into_detections(self) -> Vec<Detection>;
}

impl IntoDetections for Vec<Detection> {
    fn into_detections(self) -> Vec<Detection> {
        self
    }
}

impl IntoDetections for Option<Detection> {
    fn into_detections(self) -> Vec<Detection> {
        self.into_iter().collect()
    }
}
