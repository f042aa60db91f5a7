//! Single object track for lidar multi-object tracking.

use std::collections::VecDeque;
use std::fmt;

use nalgebra::Vector3;

use crate::tracker::config::LifecycleConfig;
use crate::tracker::geometry;
use crate::tracker::kalman_filter::{
    self, FilterOutcome, KalmanFilter, StateCovariance, StateVector,
};
use crate::tracker::object::TrackedDetection;
use crate::tracker::track_state::TrackState;

/// Unique track identifier, assigned once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Single object track.
#[derive(Debug, Clone)]
pub struct Track {
    /// Unique track identifier
    pub track_id: TrackId,
    /// Outcome of the latest frame
    pub state: TrackState,
    /// Kalman filter state mean `[px, py, pz, vx, vy, vz]`
    pub mean: StateVector,
    /// Kalman filter state covariance (6x6)
    pub covariance: StateCovariance,
    /// Prediction for the frame being processed, set by [`Track::predict`]
    pub predicted: Option<(StateVector, StateCovariance)>,
    /// Frames survived since creation
    pub age: u32,
    /// Frames since the last successful match
    pub consecutive_invisible_count: u32,
    /// Frames with a successful match, creation frame included
    pub total_visible_count: u32,
    /// Seconds since creation
    pub period: f64,
    /// Latest associated detection, carried forward by prediction when missed
    pub current: TrackedDetection,
    /// Recently associated detections, oldest first
    pub history: VecDeque<TrackedDetection>,
    history_capacity: usize,
}

impl Track {
    /// Create a new track from an unmatched detection.
    pub fn new(
        track_id: TrackId,
        detection: TrackedDetection,
        kalman_filter: &KalmanFilter,
        history_capacity: usize,
    ) -> Self {
        let (mean, covariance) = kalman_filter.initiate(&detection.anchor_point);
        let mut current = detection;
        current.velocity = Vector3::zeros();
        current.velocity_uncertainty = kalman_filter::velocity_covariance(&covariance);

        let capacity = history_capacity.max(1);
        let mut history = VecDeque::with_capacity(capacity);
        history.push_back(current.clone());

        Self {
            track_id,
            state: TrackState::New,
            mean,
            covariance,
            predicted: None,
            age: 0,
            consecutive_invisible_count: 0,
            total_visible_count: 1,
            period: 0.0,
            current,
            history,
            history_capacity: capacity,
        }
    }

    /// Fraction of the track's frames in which it was matched.
    pub fn visible_ratio(&self) -> f64 {
        self.total_visible_count as f64 / (self.age as f64 + 1.0)
    }

    pub fn velocity(&self) -> Vector3<f64> {
        kalman_filter::velocity(&self.mean)
    }

    /// Predict the state `dt` ahead without touching the confirmed state.
    ///
    /// The prediction is kept on the track for the update that follows.
    pub fn predict(&mut self, kalman_filter: &KalmanFilter, dt: f64) -> StateVector {
        let prediction = kalman_filter.predict(&self.mean, &self.covariance, dt);
        self.predicted = Some(prediction);
        prediction.0
    }

    /// Predicted state for the current frame, or the confirmed state when no
    /// prediction was made.
    pub fn predicted_state(&self) -> StateVector {
        self.predicted.map(|(mean, _)| mean).unwrap_or(self.mean)
    }

    /// Correct the track with a matched detection.
    pub fn update_with_object(
        &mut self,
        kalman_filter: &KalmanFilter,
        detection: TrackedDetection,
        association_score: f64,
        dt: f64,
        config: &LifecycleConfig,
    ) -> FilterOutcome {
        let previous_velocity = self.velocity();
        let update = kalman_filter.update(
            &self.mean,
            &self.covariance,
            &detection.anchor_point,
            association_score,
            dt,
        );
        self.mean = update.mean;
        self.covariance = update.covariance;
        self.predicted = None;

        self.current = detection;
        self.smooth_velocity(&previous_velocity, dt, config);
        self.current.anchor_point = kalman_filter::position(&self.mean);
        self.smooth_orientation(config);

        if self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(self.current.clone());

        self.age += 1;
        self.total_visible_count += 1;
        self.consecutive_invisible_count = 0;
        self.period += dt.max(0.0);
        self.state = TrackState::Tracked;
        update.outcome
    }

    /// Accept the prediction as the new state when no detection matched.
    pub fn update_without_object(&mut self, kalman_filter: &KalmanFilter, dt: f64) {
        let (mean, covariance) = self
            .predicted
            .take()
            .unwrap_or_else(|| kalman_filter.predict(&self.mean, &self.covariance, dt));

        let shift = kalman_filter::position(&mean) - kalman_filter::position(&self.mean);
        self.mean = mean;
        self.covariance = covariance;

        self.current.translate(&shift);
        self.current.velocity = self.velocity();
        self.current.velocity_uncertainty = kalman_filter::velocity_covariance(&self.covariance);

        self.age += 1;
        self.consecutive_invisible_count += 1;
        self.period += dt.max(0.0);
        self.state = TrackState::Lost;
    }

    /// Keep real accelerations; otherwise zero out velocities below the
    /// speed noise level.
    fn smooth_velocity(&mut self, previous: &Vector3<f64>, dt: f64, config: &LifecycleConfig) {
        let velocity = self.velocity();
        let accelerating = dt > f64::EPSILON
            && ((velocity - previous) / dt).norm() > config.acceleration_noise_maximum;

        if !accelerating && velocity.norm() < config.speed_noise_maximum {
            self.mean.fixed_rows_mut::<3>(3).fill(0.0);
        }
        self.current.velocity = self.velocity();
        self.current.velocity_uncertainty = kalman_filter::velocity_covariance(&self.covariance);
    }

    /// Moving tracks follow their velocity heading and re-fit their box to it.
    /// Slow tracks keep the detected direction, or the lane direction when the
    /// detected one is degenerate.
    fn smooth_orientation(&mut self, config: &LifecycleConfig) {
        let object = &mut self.current.object;
        let speed = self.current.velocity.norm();

        if speed > config.speed_noise_maximum {
            if let Some(heading) = geometry::unit_xy(&self.current.velocity) {
                object.direction = heading;
                if let Some((size, center)) = geometry::oriented_bbox(&object.cloud, &heading) {
                    object.size = size;
                    object.center = center;
                }
            }
        } else if geometry::unit_xy(&object.direction).is_none() {
            if let Some(lane) = geometry::unit_xy(&self.current.lane_direction) {
                object.direction = lane;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::config::FilterConfig;
    use crate::tracker::object::{Detection, ObjectType};
    use approx::assert_relative_eq;
    use nalgebra::{Matrix4, Point3};

    fn tracked_at(x: f64, y: f64) -> TrackedDetection {
        let cloud = vec![
            Point3::new(x - 1.0, y - 0.5, 0.0),
            Point3::new(x + 1.0, y - 0.5, 0.0),
            Point3::new(x - 1.0, y + 0.5, 1.0),
            Point3::new(x + 1.0, y + 0.5, 1.0),
        ];
        let detection = Detection {
            polygon: cloud.clone(),
            cloud,
            center: Point3::new(x, y, 0.5),
            direction: Vector3::x(),
            size: Vector3::new(2.0, 1.0, 1.0),
            object_type: ObjectType::Vehicle,
        };
        TrackedDetection::from_detection(&detection, &Matrix4::identity(), None)
    }

    fn filter() -> KalmanFilter {
        KalmanFilter::new(&FilterConfig::default()).unwrap()
    }

    #[test]
    fn test_new_track_counters() {
        let kf = filter();
        let track = Track::new(TrackId(7), tracked_at(0.0, 0.0), &kf, 3);
        assert_eq!(track.track_id, TrackId(7));
        assert_eq!(track.age, 0);
        assert_eq!(track.consecutive_invisible_count, 0);
        assert_eq!(track.total_visible_count, 1);
        assert_eq!(track.state, TrackState::New);
        assert_eq!(track.history.len(), 1);
        assert_relative_eq!(track.visible_ratio(), 1.0);
    }

    #[test]
    fn test_predict_does_not_touch_confirmed_state() {
        let kf = filter();
        let mut track = Track::new(TrackId(1), tracked_at(0.0, 0.0), &kf, 3);
        track.mean[3] = 5.0;
        let before = track.mean;
        let predicted = track.predict(&kf, 0.1);
        assert_eq!(track.mean, before);
        assert_relative_eq!(predicted[0], 0.5, epsilon = 1e-12);
        assert_eq!(track.predicted_state(), predicted);
    }

    #[test]
    fn test_update_with_object_resets_invisible_count() {
        let kf = filter();
        let config = LifecycleConfig::default();
        let mut track = Track::new(TrackId(1), tracked_at(0.0, 0.0), &kf, 2);
        track.predict(&kf, 0.1);
        track.update_without_object(&kf, 0.1);
        assert_eq!(track.consecutive_invisible_count, 1);
        assert_eq!(track.state, TrackState::Lost);

        track.predict(&kf, 0.1);
        track.update_with_object(&kf, tracked_at(0.1, 0.0), 0.2, 0.1, &config);
        assert_eq!(track.consecutive_invisible_count, 0);
        assert_eq!(track.age, 2);
        assert_eq!(track.total_visible_count, 2);
        assert_eq!(track.state, TrackState::Tracked);
        assert!(track.predicted.is_none());
        assert_relative_eq!(track.period, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_history_is_bounded() {
        let kf = filter();
        let config = LifecycleConfig::default();
        let mut track = Track::new(TrackId(1), tracked_at(0.0, 0.0), &kf, 2);
        for i in 1..5 {
            track.update_with_object(&kf, tracked_at(0.0, 0.0), 0.0, 0.1 * i as f64, &config);
        }
        assert_eq!(track.history.len(), 2);
    }

    #[test]
    fn test_static_object_has_zero_velocity() {
        let kf = filter();
        let config = LifecycleConfig::default();
        let mut track = Track::new(TrackId(1), tracked_at(0.0, 0.0), &kf, 2);
        track.update_with_object(&kf, tracked_at(0.005, 0.0), 0.0, 0.1, &config);
        assert_eq!(track.velocity(), Vector3::zeros());
        assert_eq!(track.current.velocity, Vector3::zeros());
    }

    #[test]
    fn test_moving_object_takes_velocity_heading() {
        let kf = filter();
        let config = LifecycleConfig::default();
        let mut track = Track::new(TrackId(1), tracked_at(0.0, 0.0), &kf, 4);
        for i in 1..6 {
            let dt = 0.1;
            track.predict(&kf, dt);
            track.update_with_object(&kf, tracked_at(0.0, i as f64), 0.1, dt, &config);
        }
        assert!(track.velocity().y > 5.0);
        let dir = track.current.object.direction;
        assert!(dir.y > 0.9);
        // box re-fitted along +y: length is the 1.0 extent, width the 2.0 one
        assert_relative_eq!(track.current.object.size.x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(track.current.object.size.y, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_update_without_object_moves_current_object() {
        let kf = filter();
        let mut track = Track::new(TrackId(1), tracked_at(0.0, 0.0), &kf, 2);
        track.mean[3] = 2.0;
        track.predict(&kf, 0.5);
        track.update_without_object(&kf, 0.5);
        assert_relative_eq!(track.current.anchor_point.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(track.current.object.center.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(track.current.object.cloud[0].x, 0.0, epsilon = 1e-12);
    }
}
