//! Builder for creating `Detection` objects from raw segment points.

use nalgebra::{Point3, Vector3};

use crate::tracker::{Detection, ObjectType, geometry};

/// Builds a [`Detection`] from a point segment.
///
/// Center and size come from the box around the points aligned with the
/// principal direction. The polygon defaults to that box's ground outline.
#[derive(Debug, Clone)]
pub struct DetectionBuilder {
    cloud: Vec<Point3<f64>>,
    polygon: Option<Vec<Point3<f64>>>,
    direction: Vector3<f64>,
    object_type: ObjectType,
}

impl Default for DetectionBuilder {
    fn default() -> Self {
        Self {
            cloud: Vec::new(),
            polygon: None,
            direction: Vector3::x(),
            object_type: ObjectType::Unknown,
        }
    }
}

impl DetectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the segment points, in the sensor frame.
    pub fn points(mut self, cloud: impl IntoIterator<Item = Point3<f64>>) -> Self {
        self.cloud = cloud.into_iter().collect();
        self
    }

    /// Use an explicit outline instead of the box corners.
    pub fn polygon(mut self, polygon: impl IntoIterator<Item = Point3<f64>>) -> Self {
        self.polygon = Some(polygon.into_iter().collect());
        self
    }

    /// Set the principal direction. Only its horizontal part is used.
    pub fn direction(mut self, direction: Vector3<f64>) -> Self {
        self.direction = direction;
        self
    }

    pub fn object_type(mut self, object_type: ObjectType) -> Self {
        self.object_type = object_type;
        self
    }

    /// Build the final `Detection`. An empty segment yields a zero-size box
    /// at the origin.
    pub fn build(self) -> Detection {
        let direction = geometry::unit_xy(&self.direction).unwrap_or_else(Vector3::x);
        let (size, center) = geometry::oriented_bbox(&self.cloud, &direction)
            .unwrap_or((Vector3::zeros(), Point3::origin()));
        let polygon = self
            .polygon
            .unwrap_or_else(|| geometry::bbox_polygon(&center, &direction, &size));
        Detection {
            cloud: self.cloud,
            polygon,
            center,
            direction,
            size,
            object_type: self.object_type,
        }
    }
}
