//! Weighted track-to-detection distance used for association.

use nalgebra::Vector2;

use crate::tracker::config::DistanceWeights;
use crate::tracker::geometry;
use crate::tracker::kalman_filter::{self, StateVector};
use crate::tracker::object::TrackedDetection;
use crate::tracker::track::Track;

/// Tracks faster than this use the ellipsoidal location distance.
const ELLIPSOID_SPEED_THRESHOLD: f64 = 2.0;
const ALONG_MOTION_WEIGHT: f64 = 0.5;
const ACROSS_MOTION_WEIGHT: f64 = 2.0;
/// Average cosine used when either motion has no horizontal extent.
const DEGENERATE_COS_THETA: f64 = 0.994;

/// Combines the enabled sub-distances with their weights.
#[derive(Debug, Clone)]
pub struct TrackObjectDistance {
    weights: DistanceWeights,
}

impl TrackObjectDistance {
    pub fn new(weights: DistanceWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &DistanceWeights {
        &self.weights
    }

    /// Distance between a track, predicted `dt` ahead, and a new detection.
    ///
    /// Terms whose weight is not above [`DistanceWeights::EPSILON`] are not
    /// evaluated.
    pub fn compute(
        &self,
        track: &Track,
        predicted: &StateVector,
        detection: &TrackedDetection,
        dt: f64,
    ) -> f64 {
        let w = &self.weights;
        let last = &track.current;
        let mut distance = 0.0;

        if w.location > DistanceWeights::EPSILON {
            distance += w.location * location_distance(last, predicted, detection);
        }
        if w.direction > DistanceWeights::EPSILON {
            distance += w.direction * direction_distance(last, predicted, detection, dt);
        }
        if w.bbox_size > DistanceWeights::EPSILON {
            distance += w.bbox_size * bbox_size_distance(last, detection);
        }
        if w.point_num > DistanceWeights::EPSILON {
            distance += w.point_num * point_num_distance(last, detection);
        }
        if w.histogram > DistanceWeights::EPSILON {
            distance += w.histogram * histogram_distance(last, detection);
        }
        distance
    }
}

/// Horizontal displacement between the measured anchor and the predicted
/// position. Fast tracks tolerate more error along their motion than across it.
pub fn location_distance(
    last: &TrackedDetection,
    predicted: &StateVector,
    detection: &TrackedDetection,
) -> f64 {
    let diff = detection.anchor_point - kalman_filter::position(predicted);
    let diff = Vector2::new(diff.x, diff.y);

    let motion = Vector2::new(last.velocity.x, last.velocity.y);
    let speed = motion.norm();
    if speed > ELLIPSOID_SPEED_THRESHOLD {
        let along_dir = motion / speed;
        let across_dir = Vector2::new(along_dir.y, -along_dir.x);
        let along = diff.dot(&along_dir) * ALONG_MOTION_WEIGHT;
        let across = diff.dot(&across_dir) * ACROSS_MOTION_WEIGHT;
        (along * along + across * across).sqrt()
    } else {
        diff.norm()
    }
}

/// `1 - cos` of the angle between the measured anchor motion and the motion
/// the track predicted over `dt`.
///
/// The angle is undefined when either motion is zero in the xy plane, as for
/// a static or freshly created track; an average cosine is used then.
pub fn direction_distance(
    last: &TrackedDetection,
    predicted: &StateVector,
    detection: &TrackedDetection,
    dt: f64,
) -> f64 {
    let measured_motion = detection.anchor_point - last.anchor_point;
    let predicted_motion = kalman_filter::velocity(predicted) * dt;
    let cos_theta = if geometry::unit_xy(&measured_motion).is_none()
        || geometry::unit_xy(&predicted_motion).is_none()
    {
        DEGENERATE_COS_THETA
    } else {
        geometry::vector_cos_theta_2d_xy(&measured_motion, &predicted_motion)
    };
    1.0 - cos_theta
}

/// Relative size change, comparing the axes that line up after accounting
/// for a possible 90 degree swap of the principal direction.
pub fn bbox_size_distance(last: &TrackedDetection, detection: &TrackedDetection) -> f64 {
    let old_dir = last.object.direction;
    let new_dir = detection.object.direction;
    let old_size = last.object.size;
    let new_size = detection.object.size;

    let aligned = (old_dir.x * new_dir.x + old_dir.y * new_dir.y).abs();
    let crossed = (old_dir.x * new_dir.y - old_dir.y * new_dir.x).abs();

    let (a, b) = if aligned > crossed {
        (
            relative_change(old_size.x, new_size.x),
            relative_change(old_size.y, new_size.y),
        )
    } else {
        (
            relative_change(old_size.x, new_size.y),
            relative_change(old_size.y, new_size.x),
        )
    };
    a.min(b)
}

/// Relative difference of point counts.
pub fn point_num_distance(last: &TrackedDetection, detection: &TrackedDetection) -> f64 {
    relative_change(last.point_count() as f64, detection.point_count() as f64)
}

/// Bin-wise L1 difference of the shape histograms, averaged over the three
/// axes. Zero when either side has no histogram.
pub fn histogram_distance(last: &TrackedDetection, detection: &TrackedDetection) -> f64 {
    match (&last.shape_features, &detection.shape_features) {
        (Some(old), Some(new)) if old.len() == new.len() => {
            old.iter()
                .zip(new)
                .map(|(a, b)| (a - b).abs())
                .sum::<f64>()
                / 3.0
        }
        _ => 0.0,
    }
}

fn relative_change(old: f64, new: f64) -> f64 {
    let scale = old.max(new);
    if scale <= f64::EPSILON {
        0.0
    } else {
        (old - new).abs() / scale
    }
}
