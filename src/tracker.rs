mod config;
mod distance;
mod error;
mod feature;
pub mod geometry;
pub mod kalman_filter;
pub mod matching;
mod object;
mod object_tracker;
mod options;
mod track;
mod track_set;
mod track_state;

pub use config::{DistanceWeights, FilterConfig, LifecycleConfig, MatcherConfig, TrackerConfig};
pub use distance::TrackObjectDistance;
pub use error::{ConfigError, FrameError, LaneLookupError};
pub use feature::FeatureDescriptor;
pub use kalman_filter::{FilterOutcome, FilterUpdate, KalmanFilter};
pub use matching::{AssignmentResult, HungarianMatcher};
pub use object::{Detection, ObjectType, TrackedDetection, TrackedObject};
pub use object_tracker::ObjectTracker;
pub use options::{LaneDirectionProvider, TrackerOptions};
pub use track::{Track, TrackId};
pub use track_set::TrackSet;
pub use track_state::TrackState;
