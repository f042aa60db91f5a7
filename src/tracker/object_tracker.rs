//! Main lidar object tracker: construction, prediction, association,
//! update and result collection for one frame at a time.

use nalgebra::{Matrix4, Vector3};
use tracing::{debug, error, info, warn};

use crate::tracker::config::TrackerConfig;
use crate::tracker::error::{ConfigError, FrameError};
use crate::tracker::geometry;
use crate::tracker::kalman_filter::{FilterOutcome, KalmanFilter};
use crate::tracker::matching::HungarianMatcher;
use crate::tracker::object::{Detection, TrackedDetection, TrackedObject};
use crate::tracker::options::TrackerOptions;
use crate::tracker::track::{Track, TrackId};
use crate::tracker::track_set::TrackSet;

/// Multi-object tracker for one lidar stream.
///
/// Internal state is kept in a local frame whose origin is the sensor
/// position of the first accepted frame; results are returned in world
/// coordinates. Instances share no state, so independent streams use
/// independent trackers.
#[derive(Debug, Clone)]
pub struct ObjectTracker {
    config: TrackerConfig,
    kalman_filter: KalmanFilter,
    matcher: HungarianMatcher,
    track_set: TrackSet,
    global_to_local_offset: Vector3<f64>,
    timestamp: f64,
    frame_count: u64,
    initialized: bool,
}

impl ObjectTracker {
    pub fn new(config: TrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let kalman_filter = KalmanFilter::new(&config.filter)?;
        let matcher = HungarianMatcher::new(&config.matcher);
        Ok(Self {
            config,
            kalman_filter,
            matcher,
            track_set: TrackSet::new(),
            global_to_local_offset: Vector3::zeros(),
            timestamp: 0.0,
            frame_count: 0,
            initialized: false,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Live tracks in creation order.
    pub fn tracks(&self) -> &[Track] {
        self.track_set.tracks()
    }

    pub fn track_set(&self) -> &TrackSet {
        &self.track_set
    }

    /// Number of accepted frames.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Offset added to world coordinates to obtain local ones.
    pub fn global_to_local_offset(&self) -> Vector3<f64> {
        self.global_to_local_offset
    }

    /// Process one frame and return the reportable tracks in world coordinates.
    ///
    /// A rejected frame leaves every track untouched.
    pub fn track(
        &mut self,
        detections: &[Detection],
        timestamp: f64,
        options: &TrackerOptions<'_>,
    ) -> Result<Vec<TrackedObject>, FrameError> {
        if !timestamp.is_finite() {
            error!(timestamp, "rejecting frame with invalid timestamp");
            return Err(FrameError::InvalidTimestamp(timestamp));
        }
        let Some(mut pose) = options.sensor_to_world else {
            error!(timestamp, "rejecting frame without sensor pose");
            return Err(FrameError::MissingPose { timestamp });
        };
        if pose.iter().any(|v| !v.is_finite()) {
            error!(timestamp, "rejecting frame with non-finite sensor pose");
            return Err(FrameError::InvalidPose { timestamp });
        }

        if !self.initialized {
            return Ok(self.initialize(detections, timestamp, pose, options));
        }

        let dt = timestamp - self.timestamp;
        self.timestamp = timestamp;
        self.frame_count += 1;

        // A. preprocessing
        self.transform_pose_global_to_local(&mut pose);
        let transformed = self.construct_tracked_detections(detections, &pose, options);

        // B. prediction
        self.compute_tracks_predict(dt);

        // C. association
        let (assignment, costs) =
            self.matcher
                .match_tracks(self.track_set.tracks(), &transformed, dt);
        debug!(
            frame = self.frame_count,
            tracks = self.track_set.len(),
            detections = transformed.len(),
            matches = assignment.matches.len(),
            unmatched_tracks = assignment.unmatched_tracks.len(),
            unmatched_detections = assignment.unmatched_detections.len(),
            dt,
            "multi-object tracking"
        );

        // Resolve indices to ids before the collection changes shape.
        let tracks = self.track_set.tracks();
        let assigned: Vec<(TrackId, usize, f64)> = assignment
            .matches
            .iter()
            .map(|&(i, j)| (tracks[i].track_id, j, costs[[i, j]]))
            .collect();
        let unassigned: Vec<TrackId> = assignment
            .unmatched_tracks
            .iter()
            .map(|&i| tracks[i].track_id)
            .collect();
        let mut slots: Vec<Option<TrackedDetection>> =
            transformed.into_iter().map(Some).collect();

        // D. update, delete, create
        self.update_assigned_tracks(&assigned, &mut slots, dt);
        self.update_unassigned_tracks(&unassigned, dt);
        self.track_set.remove_lost_tracks(&self.config.lifecycle);
        let new_detections = assignment
            .unmatched_detections
            .iter()
            .filter_map(|&j| slots[j].take());
        self.track_set
            .create_tracks(new_detections, &self.kalman_filter, &self.config.lifecycle);

        // E. results
        Ok(self.collect_tracked_results())
    }

    fn initialize(
        &mut self,
        detections: &[Detection],
        timestamp: f64,
        mut pose: Matrix4<f64>,
        options: &TrackerOptions<'_>,
    ) -> Vec<TrackedObject> {
        self.global_to_local_offset = -geometry::translation(&pose);
        info!(
            offset_x = self.global_to_local_offset.x,
            offset_y = self.global_to_local_offset.y,
            offset_z = self.global_to_local_offset.z,
            "local tracking frame initialized"
        );

        self.transform_pose_global_to_local(&mut pose);
        let transformed = self.construct_tracked_detections(detections, &pose, options);
        self.track_set
            .create_tracks(transformed, &self.kalman_filter, &self.config.lifecycle);

        self.timestamp = timestamp;
        self.frame_count = 1;
        self.initialized = true;
        self.collect_tracked_results()
    }

    fn transform_pose_global_to_local(&self, pose: &mut Matrix4<f64>) {
        for i in 0..3 {
            pose[(i, 3)] += self.global_to_local_offset[i];
        }
    }

    fn construct_tracked_detections(
        &self,
        detections: &[Detection],
        sensor_to_local: &Matrix4<f64>,
        options: &TrackerOptions<'_>,
    ) -> Vec<TrackedDetection> {
        let histogram_bins = self
            .config
            .matcher
            .weights
            .use_histogram()
            .then_some(self.config.matcher.histogram_bin_size);
        let sensor_heading = geometry::transform_vector(sensor_to_local, &Vector3::x());

        detections
            .iter()
            .map(|detection| {
                let mut tracked =
                    TrackedDetection::from_detection(detection, sensor_to_local, histogram_bins);
                let query = tracked.anchor_point - self.global_to_local_offset;
                tracked.lane_direction = match options.lane_directions {
                    Some(provider) => match provider.nearest_lane_direction(&query) {
                        Ok(direction) => direction,
                        Err(err) => {
                            warn!(%err, "lane direction lookup failed, using sensor heading");
                            sensor_heading
                        }
                    },
                    None => sensor_heading,
                };
                tracked
            })
            .collect()
    }

    fn compute_tracks_predict(&mut self, dt: f64) {
        for track in self.track_set.tracks_mut() {
            track.predict(&self.kalman_filter, dt);
        }
    }

    fn update_assigned_tracks(
        &mut self,
        assigned: &[(TrackId, usize, f64)],
        slots: &mut [Option<TrackedDetection>],
        dt: f64,
    ) {
        for &(track_id, det_idx, score) in assigned {
            let (Some(track), Some(detection)) =
                (self.track_set.get_mut(track_id), slots[det_idx].take())
            else {
                continue;
            };
            let outcome = track.update_with_object(
                &self.kalman_filter,
                detection,
                score,
                dt,
                &self.config.lifecycle,
            );
            if outcome != FilterOutcome::Corrected {
                debug!(%track_id, ?outcome, score, dt, "filter update not applied normally");
            }
        }
    }

    fn update_unassigned_tracks(&mut self, unassigned: &[TrackId], dt: f64) {
        for &track_id in unassigned {
            if let Some(track) = self.track_set.get_mut(track_id) {
                track.update_without_object(&self.kalman_filter, dt);
            }
        }
    }

    /// Reportable tracks, including ones briefly occluded, in world coordinates.
    fn collect_tracked_results(&self) -> Vec<TrackedObject> {
        let lifecycle = &self.config.lifecycle;
        self.track_set
            .tracks()
            .iter()
            .filter(|track| {
                track.consecutive_invisible_count <= lifecycle.collect_consecutive_invisible_maximum
                    && track.age >= lifecycle.collect_age_minimum
            })
            .map(|track| self.to_tracked_object(track))
            .collect()
    }

    fn to_tracked_object(&self, track: &Track) -> TrackedObject {
        let offset = self.global_to_local_offset;
        let to_world = -offset;
        let current = &track.current;
        let object = &current.object;

        let mut cloud = object.cloud.clone();
        geometry::translate_cloud(&mut cloud, &to_world);
        let mut polygon = object.polygon.clone();
        geometry::translate_cloud(&mut polygon, &to_world);

        TrackedObject {
            track_id: track.track_id,
            object_type: object.object_type,
            state: track.state,
            cloud,
            polygon,
            center: object.center - offset,
            anchor_point: current.anchor_point - offset,
            direction: object.direction,
            theta: geometry::heading(&object.direction),
            length: object.size.x,
            width: object.size.y,
            height: object.size.z,
            velocity: current.velocity,
            velocity_uncertainty: current.velocity_uncertainty,
            tracking_time: track.period,
            age: track.age,
            total_visible_count: track.total_visible_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::error::LaneLookupError;
    use crate::tracker::object::ObjectType;
    use crate::tracker::options::LaneDirectionProvider;
    use nalgebra::{Point3, Translation3};

    fn detection(x: f64, y: f64) -> Detection {
        let cloud = vec![
            Point3::new(x - 0.5, y - 0.5, 0.0),
            Point3::new(x + 0.5, y + 0.5, 1.0),
        ];
        Detection {
            polygon: cloud.clone(),
            cloud,
            center: Point3::new(x, y, 0.5),
            direction: Vector3::x(),
            size: Vector3::new(1.0, 1.0, 1.0),
            object_type: ObjectType::Vehicle,
        }
    }

    struct FailingLanes;

    impl LaneDirectionProvider for FailingLanes {
        fn nearest_lane_direction(
            &self,
            point: &Point3<f64>,
        ) -> Result<Vector3<f64>, LaneLookupError> {
            Err(LaneLookupError::NoLaneNearby {
                x: point.x,
                y: point.y,
                z: point.z,
            })
        }
    }

    struct NorthLanes;

    impl LaneDirectionProvider for NorthLanes {
        fn nearest_lane_direction(&self, _: &Point3<f64>) -> Result<Vector3<f64>, LaneLookupError> {
            Ok(Vector3::y())
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = TrackerConfig::default();
        config.matcher.match_distance_maximum = -1.0;
        assert!(ObjectTracker::new(config).is_err());
    }

    #[test]
    fn test_missing_pose_rejects_frame_only() {
        let mut tracker = ObjectTracker::new(TrackerConfig::default()).unwrap();
        let err = tracker
            .track(&[detection(0.0, 0.0)], 0.0, &TrackerOptions::default())
            .unwrap_err();
        assert_eq!(err, FrameError::MissingPose { timestamp: 0.0 });
        assert!(!tracker.is_initialized());
        assert!(tracker.tracks().is_empty());

        let options = TrackerOptions::new(Matrix4::identity());
        let out = tracker.track(&[detection(0.0, 0.0)], 0.1, &options).unwrap();
        assert_eq!(out.len(), 1);

        let err = tracker
            .track(&[detection(0.0, 0.0)], 0.2, &TrackerOptions::default())
            .unwrap_err();
        assert!(matches!(err, FrameError::MissingPose { .. }));
        assert_eq!(tracker.tracks()[0].age, 0);
        assert_eq!(tracker.frame_count(), 1);
    }

    #[test]
    fn test_non_finite_inputs_are_rejected() {
        let mut tracker = ObjectTracker::new(TrackerConfig::default()).unwrap();
        let options = TrackerOptions::new(Matrix4::identity());
        assert!(matches!(
            tracker.track(&[], f64::NAN, &options),
            Err(FrameError::InvalidTimestamp(_))
        ));
        let mut pose = Matrix4::identity();
        pose[(0, 3)] = f64::INFINITY;
        assert!(matches!(
            tracker.track(&[], 0.0, &TrackerOptions::new(pose)),
            Err(FrameError::InvalidPose { .. })
        ));
    }

    #[test]
    fn test_local_offset_from_first_pose() {
        let mut tracker = ObjectTracker::new(TrackerConfig::default()).unwrap();
        let pose = Translation3::new(500_000.0, 4_000_000.0, 10.0).to_homogeneous();
        tracker
            .track(&[detection(1.0, 2.0)], 0.0, &TrackerOptions::new(pose))
            .unwrap();
        assert_eq!(
            tracker.global_to_local_offset(),
            Vector3::new(-500_000.0, -4_000_000.0, -10.0)
        );
        // internal state stays near the origin
        let anchor = tracker.tracks()[0].current.anchor_point;
        assert!(anchor.coords.norm() < 10.0);
    }

    #[test]
    fn test_histogram_only_computed_when_weighted() {
        let options = TrackerOptions::new(Matrix4::identity());
        let mut tracker = ObjectTracker::new(TrackerConfig::default()).unwrap();
        tracker.track(&[detection(1.0, 0.0)], 0.0, &options).unwrap();
        assert_eq!(
            tracker.tracks()[0].current.shape_features.as_ref().map(Vec::len),
            Some(3 * tracker.config().matcher.histogram_bin_size)
        );

        let mut config = TrackerConfig::default();
        config.matcher.weights.histogram = 0.0;
        let mut tracker = ObjectTracker::new(config).unwrap();
        tracker.track(&[detection(1.0, 0.0)], 0.0, &options).unwrap();
        tracker.track(&[detection(1.0, 0.0)], 0.1, &options).unwrap();
        assert_eq!(tracker.tracks().len(), 1);
        assert!(tracker.tracks()[0].current.shape_features.is_none());
        assert!(tracker.tracks()[0].history.iter().all(|d| d.shape_features.is_none()));
    }

    #[test]
    fn test_lane_direction_falls_back_to_sensor_heading() {
        let mut tracker = ObjectTracker::new(TrackerConfig::default()).unwrap();
        let yaw = nalgebra::Rotation3::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2);
        let failing = FailingLanes;
        let options = TrackerOptions::new(yaw.to_homogeneous()).with_lane_directions(&failing);
        tracker.track(&[detection(1.0, 0.0)], 0.0, &options).unwrap();
        let lane = tracker.tracks()[0].current.lane_direction;
        assert!((lane - Vector3::y()).norm() < 1e-9);

        let north = NorthLanes;
        let options = TrackerOptions::new(Matrix4::identity()).with_lane_directions(&north);
        let mut tracker = ObjectTracker::new(TrackerConfig::default()).unwrap();
        tracker.track(&[detection(1.0, 0.0)], 0.0, &options).unwrap();
        assert_eq!(tracker.tracks()[0].current.lane_direction, Vector3::y());
    }
}
