//! Tracker configuration.
//!
//! All thresholds and weights are passed at construction time. Deserialized
//! bundles must name every field; nothing is filled in silently.

use serde::{Deserialize, Serialize};

use crate::tracker::error::ConfigError;

/// Weights of the sub-distances combined by the association metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceWeights {
    pub location: f64,
    pub direction: f64,
    pub bbox_size: f64,
    pub point_num: f64,
    pub histogram: f64,
}

impl Default for DistanceWeights {
    fn default() -> Self {
        Self {
            location: 0.6,
            direction: 0.2,
            bbox_size: 0.1,
            point_num: 0.1,
            histogram: 0.5,
        }
    }
}

impl DistanceWeights {
    /// Weights at or below this value disable their term.
    pub const EPSILON: f64 = f32::EPSILON as f64;

    pub fn use_histogram(&self) -> bool {
        self.histogram > Self::EPSILON
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("location", self.location),
            ("direction", self.direction),
            ("bbox_size", self.bbox_size),
            ("point_num", self.point_num),
            ("histogram", self.histogram),
        ];
        for (name, value) in named {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { name, value });
            }
        }
        if named.iter().all(|(_, w)| *w <= Self::EPSILON) {
            return Err(ConfigError::NoEnabledWeights);
        }
        Ok(())
    }
}

/// Data association settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Gate: pairs with a larger distance are never matched.
    pub match_distance_maximum: f64,
    pub weights: DistanceWeights,
    /// Bins per axis of the shape histogram.
    pub histogram_bin_size: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            match_distance_maximum: 4.0,
            weights: DistanceWeights::default(),
            histogram_bin_size: 10,
        }
    }
}

/// Kalman filter settings, shared by every track of one tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub measurement_noise: f64,
    pub initial_velocity_noise: f64,
    pub xy_propagation_noise: f64,
    pub z_propagation_noise: f64,
    /// Updates whose association score exceeds this are rejected as outliers.
    pub association_score_maximum: f64,
    /// Largest velocity correction a single update may apply.
    pub breakdown_threshold_maximum: f64,
    /// Inflate measurement noise with the association score.
    pub use_adaptive: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            measurement_noise: 0.4,
            initial_velocity_noise: 5.0,
            xy_propagation_noise: 10.0,
            z_propagation_noise: 10.0,
            association_score_maximum: 4.0,
            breakdown_threshold_maximum: 10.0,
            use_adaptive: true,
        }
    }
}

impl FilterConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        positive("measurement_noise", self.measurement_noise)?;
        positive("initial_velocity_noise", self.initial_velocity_noise)?;
        positive("xy_propagation_noise", self.xy_propagation_noise)?;
        positive("z_propagation_noise", self.z_propagation_noise)?;
        positive("association_score_maximum", self.association_score_maximum)?;
        positive(
            "breakdown_threshold_maximum",
            self.breakdown_threshold_maximum,
        )?;
        Ok(())
    }
}

/// Track creation, removal and reporting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Number of associated detections cached per track.
    pub track_cached_history_size_maximum: usize,
    /// Tracks invisible for more consecutive frames than this are removed.
    pub track_consecutive_invisible_maximum: u32,
    /// Tracks seen in a smaller fraction of their frames are removed.
    pub track_visible_ratio_minimum: f64,
    /// Tracks younger than this are neither reported nor ratio-pruned.
    pub collect_age_minimum: u32,
    /// Tracks invisible for more consecutive frames than this are not reported.
    pub collect_consecutive_invisible_maximum: u32,
    /// Velocity changes implying a larger acceleration are taken as real
    /// motion and never zeroed by the static check.
    pub acceleration_noise_maximum: f64,
    /// Speeds below this are treated as noise on a static object.
    pub speed_noise_maximum: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            track_cached_history_size_maximum: 5,
            track_consecutive_invisible_maximum: 1,
            track_visible_ratio_minimum: 0.6,
            collect_age_minimum: 0,
            collect_consecutive_invisible_maximum: 0,
            acceleration_noise_maximum: 5.0,
            speed_noise_maximum: 0.4,
        }
    }
}

impl LifecycleConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.track_cached_history_size_maximum == 0 {
            return Err(ConfigError::ZeroCount {
                name: "track_cached_history_size_maximum",
            });
        }
        let ratio = self.track_visible_ratio_minimum;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::OutOfRange {
                name: "track_visible_ratio_minimum",
                value: ratio,
                expected: "a value in [0, 1]",
            });
        }
        non_negative("acceleration_noise_maximum", self.acceleration_noise_maximum)?;
        non_negative("speed_noise_maximum", self.speed_noise_maximum)?;
        Ok(())
    }
}

/// Complete configuration of an [`ObjectTracker`](crate::tracker::ObjectTracker).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub matcher: MatcherConfig,
    pub filter: FilterConfig,
    pub lifecycle: LifecycleConfig,
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive(
            "match_distance_maximum",
            self.matcher.match_distance_maximum,
        )?;
        self.matcher.weights.validate()?;
        if self.matcher.histogram_bin_size == 0 {
            return Err(ConfigError::ZeroCount {
                name: "histogram_bin_size",
            });
        }
        self.filter.validate()?;
        self.lifecycle.validate()
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            expected: "a finite value greater than zero",
        })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            expected: "a finite, non-negative value",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TrackerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_negative_weight() {
        let mut config = TrackerConfig::default();
        config.matcher.weights.direction = -0.1;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidWeight {
                name: "direction",
                value: -0.1
            })
        );
    }

    #[test]
    fn test_rejects_all_zero_weights() {
        let mut config = TrackerConfig::default();
        config.matcher.weights = DistanceWeights {
            location: 0.0,
            direction: 0.0,
            bbox_size: 0.0,
            point_num: 0.0,
            histogram: 0.0,
        };
        assert_eq!(config.validate(), Err(ConfigError::NoEnabledWeights));
    }

    #[test]
    fn test_rejects_non_positive_noise() {
        let mut config = TrackerConfig::default();
        config.filter.measurement_noise = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                name: "measurement_noise",
                ..
            })
        ));

        let mut config = TrackerConfig::default();
        config.filter.z_propagation_noise = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_lifecycle_values() {
        let mut config = TrackerConfig::default();
        config.lifecycle.track_visible_ratio_minimum = 1.5;
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.lifecycle.track_cached_history_size_maximum = 0;
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.matcher.histogram_bin_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_histogram_toggle() {
        let mut weights = DistanceWeights::default();
        assert!(weights.use_histogram());
        weights.histogram = 0.0;
        assert!(!weights.use_histogram());
    }

    #[test]
    fn test_deserialize_requires_every_field() {
        let json = serde_json::to_string(&TrackerConfig::default()).unwrap();
        let parsed: TrackerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, TrackerConfig::default());

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["filter"]
            .as_object_mut()
            .unwrap()
            .remove("measurement_noise");
        assert!(serde_json::from_value::<TrackerConfig>(value).is_err());
    }

    #[test]
    fn test_deserialize_rejects_negative_counts() {
        let mut value = serde_json::to_value(TrackerConfig::default()).unwrap();
        value["lifecycle"]["collect_age_minimum"] = serde_json::json!(-1);
        assert!(serde_json::from_value::<TrackerConfig>(value).is_err());
    }
}
