//! Rigid-transform and oriented-box helpers for lidar objects.
//!
//! All poses are 4x4 homogeneous matrices (rotation + translation). Points
//! receive the translation, direction vectors only the rotation.

use nalgebra::{Matrix4, Point3, Vector2, Vector3};

/// Lengths below this are treated as degenerate directions.
pub const DIRECTION_EPSILON: f64 = 1e-6;

/// Apply a rigid transform to a point.
#[inline]
pub fn transform_point(pose: &Matrix4<f64>, point: &Point3<f64>) -> Point3<f64> {
    let h = pose * point.to_homogeneous();
    Point3::new(h.x, h.y, h.z)
}

/// Apply only the rotation part of a rigid transform to a vector.
#[inline]
pub fn transform_vector(pose: &Matrix4<f64>, vector: &Vector3<f64>) -> Vector3<f64> {
    pose.fixed_view::<3, 3>(0, 0) * vector
}

/// Apply a rigid transform to every point of a cloud in place.
pub fn transform_cloud(pose: &Matrix4<f64>, cloud: &mut [Point3<f64>]) {
    for point in cloud.iter_mut() {
        *point = transform_point(pose, point);
    }
}

/// Shift every point of a cloud by a fixed offset.
pub fn translate_cloud(cloud: &mut [Point3<f64>], offset: &Vector3<f64>) {
    for point in cloud.iter_mut() {
        *point += *offset;
    }
}

/// Translation part of a pose.
#[inline]
pub fn translation(pose: &Matrix4<f64>) -> Vector3<f64> {
    Vector3::new(pose[(0, 3)], pose[(1, 3)], pose[(2, 3)])
}

/// Mean of the cloud points, `None` for an empty cloud.
pub fn barycenter(cloud: &[Point3<f64>]) -> Option<Point3<f64>> {
    if cloud.is_empty() {
        return None;
    }
    let sum = cloud
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords);
    Some(Point3::from(sum / cloud.len() as f64))
}

/// Cosine of the angle between two vectors projected onto the xy plane.
///
/// Returns 0 when either projection is degenerate.
pub fn vector_cos_theta_2d_xy(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let a = Vector2::new(a.x, a.y);
    let b = Vector2::new(b.x, b.y);
    let denom = a.norm() * b.norm();
    if denom < DIRECTION_EPSILON * DIRECTION_EPSILON {
        return 0.0;
    }
    (a.dot(&b) / denom).clamp(-1.0, 1.0)
}

/// Heading angle of a direction in the xy plane.
///
/// A forward component below `f64::MIN_POSITIVE` maps to +/-90 degrees by the
/// sign of the lateral component, instead of relying on `atan2(y, 0)`.
pub fn heading(direction: &Vector3<f64>) -> f64 {
    if direction.x.abs() < f64::MIN_POSITIVE {
        if direction.y > 0.0 {
            std::f64::consts::FRAC_PI_2
        } else {
            -std::f64::consts::FRAC_PI_2
        }
    } else {
        direction.y.atan2(direction.x)
    }
}

/// Unit horizontal direction, `None` when the xy projection is degenerate.
pub fn unit_xy(direction: &Vector3<f64>) -> Option<Vector3<f64>> {
    let xy = Vector3::new(direction.x, direction.y, 0.0);
    let norm = xy.norm();
    (norm > DIRECTION_EPSILON).then(|| xy / norm)
}

/// Oriented box around a cloud, aligned with `direction` in the xy plane.
///
/// Returns the box size as (length along direction, width across, height)
/// and the box center. `None` for an empty cloud.
pub fn oriented_bbox(
    cloud: &[Point3<f64>],
    direction: &Vector3<f64>,
) -> Option<(Vector3<f64>, Point3<f64>)> {
    if cloud.is_empty() {
        return None;
    }
    let dir = unit_xy(direction).unwrap_or_else(Vector3::x);
    let ortho = Vector3::new(-dir.y, dir.x, 0.0);

    let mut min = Vector3::repeat(f64::MAX);
    let mut max = Vector3::repeat(f64::MIN);
    for p in cloud {
        let local = Vector3::new(p.coords.dot(&dir), p.coords.dot(&ortho), p.z);
        min = min.inf(&local);
        max = max.sup(&local);
    }

    let size = max - min;
    let mid = (max + min) * 0.5;
    let center = dir * mid.x + ortho * mid.y + Vector3::new(0.0, 0.0, mid.z);
    Some((size, Point3::from(center)))
}

/// Ground-level corners of an oriented box, counter-clockwise.
pub fn bbox_polygon(
    center: &Point3<f64>,
    direction: &Vector3<f64>,
    size: &Vector3<f64>,
) -> Vec<Point3<f64>> {
    let dir = unit_xy(direction).unwrap_or_else(Vector3::x);
    let ortho = Vector3::new(-dir.y, dir.x, 0.0);
    let half_l = dir * (size.x * 0.5);
    let half_w = ortho * (size.y * 0.5);
    let base = Point3::new(center.x, center.y, center.z - size.z * 0.5);
    vec![
        base + half_l + half_w,
        base - half_l + half_w,
        base - half_l - half_w,
        base + half_l - half_w,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Rotation3, Translation3};

    fn pose(yaw: f64, t: [f64; 3]) -> Matrix4<f64> {
        Translation3::new(t[0], t[1], t[2]).to_homogeneous()
            * Rotation3::from_axis_angle(&Vector3::z_axis(), yaw).to_homogeneous()
    }

    #[test]
    fn test_transform_point_and_vector() {
        let p = pose(std::f64::consts::FRAC_PI_2, [10.0, 20.0, 1.0]);
        let moved = transform_point(&p, &Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(moved, Point3::new(10.0, 21.0, 1.0), epsilon = 1e-9);

        let dir = transform_vector(&p, &Vector3::x());
        assert_relative_eq!(dir, Vector3::y(), epsilon = 1e-9);
        assert_relative_eq!(translation(&p), Vector3::new(10.0, 20.0, 1.0));
    }

    #[test]
    fn test_barycenter() {
        let cloud = [Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 4.0, 6.0)];
        assert_eq!(barycenter(&cloud), Some(Point3::new(1.0, 2.0, 3.0)));
        assert_eq!(barycenter(&[]), None);
    }

    #[test]
    fn test_cos_theta_degenerate() {
        let zero = Vector3::zeros();
        assert_eq!(vector_cos_theta_2d_xy(&zero, &Vector3::x()), 0.0);
        assert_relative_eq!(vector_cos_theta_2d_xy(&Vector3::x(), &-Vector3::x()), -1.0);
    }

    #[test]
    fn test_heading_special_cases() {
        assert_relative_eq!(heading(&Vector3::new(0.0, 2.0, 0.0)), std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(heading(&Vector3::new(0.0, -2.0, 0.0)), -std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(heading(&Vector3::new(1.0, 1.0, 0.0)), std::f64::consts::FRAC_PI_4);
    }

    #[test]
    fn test_oriented_bbox_rotated() {
        // 4 x 2 box rotated by 90 degrees, centered at (5, 5)
        let cloud = vec![
            Point3::new(4.0, 3.0, 0.0),
            Point3::new(6.0, 3.0, 0.0),
            Point3::new(4.0, 7.0, 1.5),
            Point3::new(6.0, 7.0, 1.5),
        ];
        let (size, center) = oriented_bbox(&cloud, &Vector3::y()).unwrap();
        assert_relative_eq!(size, Vector3::new(4.0, 2.0, 1.5), epsilon = 1e-9);
        assert_relative_eq!(center, Point3::new(5.0, 5.0, 0.75), epsilon = 1e-9);
        assert!(oriented_bbox(&[], &Vector3::x()).is_none());
    }

    #[test]
    fn test_bbox_polygon_corners() {
        let poly = bbox_polygon(
            &Point3::new(0.0, 0.0, 1.0),
            &Vector3::x(),
            &Vector3::new(4.0, 2.0, 2.0),
        );
        assert_eq!(poly.len(), 4);
        assert_relative_eq!(poly[0], Point3::new(2.0, 1.0, 0.0));
        assert_relative_eq!(poly[2], Point3::new(-2.0, -1.0, 0.0));
    }
}
