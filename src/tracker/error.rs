//! Error types for tracker setup and per-frame processing.

use thiserror::Error;

/// Errors raised while validating a [`TrackerConfig`](crate::tracker::TrackerConfig).
///
/// These are fatal to setup: the tracker refuses to start rather than fall
/// back to defaults.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A weight is negative or not finite.
    #[error("invalid {name} weight: {value}")]
    InvalidWeight { name: &'static str, value: f64 },
    /// Every distance weight is zero, so no distance can be computed.
    #[error("all distance weights are zero")]
    NoEnabledWeights,
    /// A threshold or noise value is outside its valid range.
    #[error("invalid {name}: {value} (expected {expected})")]
    OutOfRange {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },
    /// A count parameter that must be positive is zero.
    #[error("{name} must be greater than zero")]
    ZeroCount { name: &'static str },
}

/// Errors that reject a single frame. The tracker stays usable afterwards.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    /// No sensor-to-world pose was supplied with the frame.
    #[error("sensor pose is missing for frame at {timestamp}")]
    MissingPose { timestamp: f64 },
    /// The supplied pose contains NaN or infinite entries.
    #[error("sensor pose for frame at {timestamp} is not finite")]
    InvalidPose { timestamp: f64 },
    /// The frame timestamp is NaN or infinite.
    #[error("frame timestamp {0} is not finite")]
    InvalidTimestamp(f64),
}

/// Failure of a lane-direction lookup. Never fatal: the tracker substitutes
/// the sensor heading.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LaneLookupError {
    #[error("no lane found near ({x:.2}, {y:.2}, {z:.2})")]
    NoLaneNearby { x: f64, y: f64, z: f64 },
    #[error("lane direction service unavailable: {0}")]
    Unavailable(String),
}
