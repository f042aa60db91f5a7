//! Detection inputs, frame-local tracked detections and tracker outputs.

use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

use crate::tracker::feature::FeatureDescriptor;
use crate::tracker::geometry;
use crate::tracker::track::TrackId;
use crate::tracker::track_state::TrackState;

/// Object class label assigned by the upstream classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObjectType {
    #[default]
    Unknown,
    UnknownMovable,
    UnknownUnmovable,
    Pedestrian,
    Bicycle,
    Vehicle,
}

/// One segmented object of a lidar sweep, in the sensor frame.
#[derive(Debug, Clone)]
pub struct Detection {
    pub cloud: Vec<Point3<f64>>,
    /// Ground-level outline of the object.
    pub polygon: Vec<Point3<f64>>,
    pub center: Point3<f64>,
    /// Principal direction of the object.
    pub direction: Vector3<f64>,
    /// Length, width and height.
    pub size: Vector3<f64>,
    pub object_type: ObjectType,
}

impl Detection {
    pub fn point_count(&self) -> usize {
        self.cloud.len()
    }

    /// Transform cloud, polygon, center and direction by a rigid pose.
    pub fn transform(&mut self, pose: &Matrix4<f64>) {
        geometry::transform_cloud(pose, &mut self.cloud);
        geometry::transform_cloud(pose, &mut self.polygon);
        self.center = geometry::transform_point(pose, &self.center);
        self.direction = geometry::transform_vector(pose, &self.direction);
    }

    /// Shift every positional attribute by `offset`.
    pub fn translate(&mut self, offset: &Vector3<f64>) {
        geometry::translate_cloud(&mut self.cloud, offset);
        geometry::translate_cloud(&mut self.polygon, offset);
        self.center += *offset;
    }
}

/// A detection expressed in the tracker's local frame, decorated with the
/// attributes association needs. Also the per-track "current object".
#[derive(Debug, Clone)]
pub struct TrackedDetection {
    pub object: Detection,
    pub barycenter: Point3<f64>,
    /// Point used for association and filtering.
    pub anchor_point: Point3<f64>,
    /// Present only when histogram matching is enabled.
    pub shape_features: Option<Vec<f64>>,
    pub lane_direction: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub velocity_uncertainty: Matrix3<f64>,
}

impl TrackedDetection {
    /// Build a tracked detection from a sensor-frame detection.
    ///
    /// The shape histogram is taken in the sensor frame before the object is
    /// moved into the local frame by `sensor_to_local`.
    pub fn from_detection(
        detection: &Detection,
        sensor_to_local: &Matrix4<f64>,
        histogram_bins: Option<usize>,
    ) -> Self {
        let mut object = detection.clone();
        let shape_features = histogram_bins
            .map(|bins| FeatureDescriptor::new(&object.cloud).compute_histogram(bins));

        object.transform(sensor_to_local);
        let barycenter = geometry::barycenter(&object.cloud).unwrap_or(object.center);

        Self {
            object,
            barycenter,
            anchor_point: barycenter,
            shape_features,
            lane_direction: Vector3::zeros(),
            velocity: Vector3::zeros(),
            velocity_uncertainty: Matrix3::zeros(),
        }
    }

    pub fn point_count(&self) -> usize {
        self.object.point_count()
    }

    /// Move the whole object, anchor included.
    pub fn translate(&mut self, offset: &Vector3<f64>) {
        self.object.translate(offset);
        self.barycenter += *offset;
        self.anchor_point += *offset;
    }
}

/// A reported object: the current state of one track in world coordinates.
#[derive(Debug, Clone)]
pub struct TrackedObject {
    pub track_id: TrackId,
    pub object_type: ObjectType,
    pub state: TrackState,
    pub cloud: Vec<Point3<f64>>,
    pub polygon: Vec<Point3<f64>>,
    pub center: Point3<f64>,
    pub anchor_point: Point3<f64>,
    pub direction: Vector3<f64>,
    /// Heading in radians.
    pub theta: f64,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub velocity: Vector3<f64>,
    pub velocity_uncertainty: Matrix3<f64>,
    /// Seconds since the track was created.
    pub tracking_time: f64,
    pub age: u32,
    pub total_visible_count: u32,
}
