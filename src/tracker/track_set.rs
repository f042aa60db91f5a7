//! The collection of live tracks owned by one tracker.

use tracing::debug;

use crate::tracker::config::LifecycleConfig;
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::object::TrackedDetection;
use crate::tracker::track::{Track, TrackId};

/// Live tracks in creation order.
///
/// Ids come from a per-set counter and only grow, so creation order is also
/// id order and lookups can binary search.
#[derive(Debug, Clone, Default)]
pub struct TrackSet {
    tracks: Vec<Track>,
    next_id: u64,
}

impl TrackSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.position(id).map(|i| &self.tracks[i])
    }

    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.position(id).map(|i| &mut self.tracks[i])
    }

    fn position(&self, id: TrackId) -> Option<usize> {
        self.tracks.binary_search_by_key(&id, |t| t.track_id).ok()
    }

    fn next_track_id(&mut self) -> TrackId {
        self.next_id += 1;
        TrackId(self.next_id)
    }

    /// Start a new track for each detection, in order.
    pub fn create_tracks(
        &mut self,
        detections: impl IntoIterator<Item = TrackedDetection>,
        kalman_filter: &KalmanFilter,
        config: &LifecycleConfig,
    ) -> Vec<TrackId> {
        detections
            .into_iter()
            .map(|detection| {
                let id = self.next_track_id();
                self.tracks.push(Track::new(
                    id,
                    detection,
                    kalman_filter,
                    config.track_cached_history_size_maximum,
                ));
                id
            })
            .collect()
    }

    /// Drop tracks that have been invisible for too long or, once old enough,
    /// are seen in too small a fraction of their frames.
    pub fn remove_lost_tracks(&mut self, config: &LifecycleConfig) -> Vec<TrackId> {
        let mut removed = Vec::new();
        self.tracks.retain(|track| {
            let too_long_invisible =
                track.consecutive_invisible_count > config.track_consecutive_invisible_maximum;
            let rarely_visible = track.age >= config.collect_age_minimum
                && track.visible_ratio() < config.track_visible_ratio_minimum;
            if too_long_invisible || rarely_visible {
                debug!(
                    track_id = %track.track_id,
                    age = track.age,
                    invisible = track.consecutive_invisible_count,
                    visible_ratio = track.visible_ratio(),
                    "removing lost track"
                );
                removed.push(track.track_id);
                false
            } else {
                true
            }
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::config::FilterConfig;
    use crate::tracker::object::{Detection, ObjectType};
    use nalgebra::{Matrix4, Point3, Vector3};

    fn detection(x: f64) -> TrackedDetection {
        let det = Detection {
            cloud: vec![Point3::new(x, 0.0, 0.0)],
            polygon: Vec::new(),
            center: Point3::new(x, 0.0, 0.0),
            direction: Vector3::x(),
            size: Vector3::new(1.0, 1.0, 1.0),
            object_type: ObjectType::Pedestrian,
        };
        TrackedDetection::from_detection(&det, &Matrix4::identity(), None)
    }

    fn setup() -> (TrackSet, KalmanFilter, LifecycleConfig) {
        (
            TrackSet::new(),
            KalmanFilter::new(&FilterConfig::default()).unwrap(),
            LifecycleConfig::default(),
        )
    }

    #[test]
    fn test_ids_are_distinct_and_increasing() {
        let (mut set, kf, config) = setup();
        let first = set.create_tracks([detection(0.0), detection(1.0)], &kf, &config);
        let second = set.create_tracks([detection(2.0)], &kf, &config);
        assert_eq!(first, vec![TrackId(1), TrackId(2)]);
        assert_eq!(second, vec![TrackId(3)]);
        assert_eq!(set.get(TrackId(2)).map(|t| t.age), Some(0));
        assert!(set.get(TrackId(9)).is_none());
    }

    #[test]
    fn test_ids_are_not_reused_after_removal() {
        let (mut set, kf, config) = setup();
        set.create_tracks([detection(0.0)], &kf, &config);
        set.get_mut(TrackId(1)).unwrap().consecutive_invisible_count = 5;
        assert_eq!(set.remove_lost_tracks(&config), vec![TrackId(1)]);
        assert!(set.is_empty());
        let ids = set.create_tracks([detection(0.0)], &kf, &config);
        assert_eq!(ids, vec![TrackId(2)]);
    }

    #[test]
    fn test_visible_ratio_waits_for_minimum_age() {
        let (mut set, kf, mut config) = setup();
        config.collect_age_minimum = 3;
        config.track_consecutive_invisible_maximum = 10;
        set.create_tracks([detection(0.0)], &kf, &config);

        let track = set.get_mut(TrackId(1)).unwrap();
        track.age = 2;
        track.consecutive_invisible_count = 2;
        // ratio 1/3 is below the minimum, but the track is still young
        assert!(set.remove_lost_tracks(&config).is_empty());

        let track = set.get_mut(TrackId(1)).unwrap();
        track.age = 3;
        track.consecutive_invisible_count = 3;
        assert_eq!(set.remove_lost_tracks(&config), vec![TrackId(1)]);
    }

    #[test]
    fn test_creation_order_is_kept() {
        let (mut set, kf, config) = setup();
        set.create_tracks([detection(5.0), detection(1.0), detection(3.0)], &kf, &config);
        let ids: Vec<_> = set.tracks().iter().map(|t| t.track_id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
