//! Per-frame inputs besides the detections themselves.

use nalgebra::{Matrix4, Point3, Vector3};

use crate::tracker::error::LaneLookupError;

/// Map service answering "which way does the nearest lane run here".
pub trait LaneDirectionProvider {
    /// Unit direction of the lane nearest to a world-frame point.
    fn nearest_lane_direction(&self, point: &Point3<f64>) -> Result<Vector3<f64>, LaneLookupError>;
}

/// Frame-level options for [`ObjectTracker::track`](crate::tracker::ObjectTracker::track).
#[derive(Clone, Copy, Default)]
pub struct TrackerOptions<'a> {
    /// Rigid transform from the sensor frame to the world frame.
    pub sensor_to_world: Option<Matrix4<f64>>,
    pub lane_directions: Option<&'a dyn LaneDirectionProvider>,
}

impl<'a> TrackerOptions<'a> {
    pub fn new(sensor_to_world: Matrix4<f64>) -> Self {
        Self {
            sensor_to_world: Some(sensor_to_world),
            lane_directions: None,
        }
    }

    pub fn with_lane_directions(mut self, provider: &'a dyn LaneDirectionProvider) -> Self {
        self.lane_directions = Some(provider);
        self
    }
}

impl std::fmt::Debug for TrackerOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerOptions")
            .field("sensor_to_world", &self.sensor_to_world)
            .field("lane_directions", &self.lane_directions.is_some())
            .finish()
    }
}
