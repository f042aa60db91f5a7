//! Constant-velocity Kalman filter for lidar object anchors, built on nalgebra.
//!
//! The state is `[px, py, pz, vx, vy, vz]`. A measurement is the anchor point
//! of the associated detection together with the velocity implied by the
//! anchor displacement since the last confirmed state. One filter value holds
//! the shared parameters; each track owns its own mean and covariance.

use nalgebra::{Matrix3, Matrix6, Point3, Vector3, Vector6};
use tracing::{debug, warn};

use crate::tracker::config::FilterConfig;
use crate::tracker::error::ConfigError;

pub type StateVector = Vector6<f64>;
pub type StateCovariance = Matrix6<f64>;

/// Time steps at or below this leave the state untouched.
const DT_EPSILON: f64 = f64::EPSILON;

/// How a measurement update was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Regular predict + correct.
    Corrected,
    /// Corrected, with the velocity correction clamped to the breakdown threshold.
    Breakdown,
    /// Association score above the maximum; the prediction was kept.
    Rejected,
    /// Innovation covariance could not be inverted; the prediction was kept.
    Singular,
    /// Degenerate time step; the state was returned unchanged.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct FilterUpdate {
    pub mean: StateVector,
    pub covariance: StateCovariance,
    pub outcome: FilterOutcome,
}

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    config: FilterConfig,
}

impl KalmanFilter {
    pub fn new(config: &FilterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config: *config })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Initial state at `anchor` with zero velocity.
    pub fn initiate(&self, anchor: &Point3<f64>) -> (StateVector, StateCovariance) {
        let mut mean = StateVector::zeros();
        mean.fixed_rows_mut::<3>(0).copy_from(&anchor.coords);

        let mut cov = StateCovariance::zeros();
        for i in 0..3 {
            cov[(i, i)] = self.config.measurement_noise;
            cov[(i + 3, i + 3)] = self.config.initial_velocity_noise;
        }
        (mean, cov)
    }

    fn motion_mat(dt: f64) -> Matrix6<f64> {
        let mut f = Matrix6::identity();
        for i in 0..3 {
            f[(i, i + 3)] = dt;
        }
        f
    }

    /// Continuous white-noise acceleration, horizontal and vertical axes
    /// with separate intensities.
    fn process_noise(&self, dt: f64) -> Matrix6<f64> {
        let mut q = Matrix6::zeros();
        let dt2 = dt * dt;
        let dt3 = dt2 * dt;
        for i in 0..3 {
            let intensity = if i < 2 {
                self.config.xy_propagation_noise
            } else {
                self.config.z_propagation_noise
            };
            q[(i, i)] = intensity * dt3 / 3.0;
            q[(i, i + 3)] = intensity * dt2 / 2.0;
            q[(i + 3, i)] = intensity * dt2 / 2.0;
            q[(i + 3, i + 3)] = intensity * dt;
        }
        q
    }

    pub fn predict(
        &self,
        mean: &StateVector,
        covariance: &StateCovariance,
        dt: f64,
    ) -> (StateVector, StateCovariance) {
        if !is_valid_step(dt) {
            return (*mean, *covariance);
        }
        let f = Self::motion_mat(dt);
        let new_mean = f * mean;
        let new_covariance = f * covariance * f.transpose() + self.process_noise(dt);
        (new_mean, new_covariance)
    }

    /// Innovation covariance of a full-state measurement, with the
    /// measurement noise scaled by `noise_scale`.
    pub fn project(&self, covariance: &StateCovariance, noise_scale: f64) -> StateCovariance {
        covariance + StateCovariance::identity() * (self.config.measurement_noise * noise_scale)
    }

    /// Predict by `dt`, then correct with the anchor observed at the end of
    /// the step.
    pub fn update(
        &self,
        mean: &StateVector,
        covariance: &StateCovariance,
        measurement: &Point3<f64>,
        association_score: f64,
        dt: f64,
    ) -> FilterUpdate {
        if !is_valid_step(dt) {
            return FilterUpdate {
                mean: *mean,
                covariance: *covariance,
                outcome: FilterOutcome::Skipped,
            };
        }

        let (pred_mean, pred_cov) = self.predict(mean, covariance, dt);

        if association_score > self.config.association_score_maximum {
            debug!(
                association_score,
                maximum = self.config.association_score_maximum,
                "rejecting outlier measurement"
            );
            return FilterUpdate {
                mean: pred_mean,
                covariance: pred_cov,
                outcome: FilterOutcome::Rejected,
            };
        }

        let noise_scale = if self.config.use_adaptive {
            1.0 + association_score.max(0.0) / self.config.association_score_maximum
        } else {
            1.0
        };
        let projected_cov = self.project(&pred_cov, noise_scale);

        let Some(s_inv) = projected_cov.try_inverse() else {
            warn!("innovation covariance is singular, keeping prediction");
            return FilterUpdate {
                mean: pred_mean,
                covariance: pred_cov,
                outcome: FilterOutcome::Singular,
            };
        };

        let measured_velocity = (measurement.coords - position(mean).coords) / dt;
        let mut observed = StateVector::zeros();
        observed.fixed_rows_mut::<3>(0).copy_from(&measurement.coords);
        observed.fixed_rows_mut::<3>(3).copy_from(&measured_velocity);

        let innovation = observed - pred_mean;
        // K = P * S^-1, the measurement matrix is the identity
        let kalman_gain = pred_cov * s_inv;
        let mut correction = kalman_gain * innovation;

        let mut outcome = FilterOutcome::Corrected;
        let velocity_gain = correction.fixed_rows::<3>(3).norm();
        let threshold = self.config.breakdown_threshold_maximum;
        if velocity_gain > threshold {
            debug!(velocity_gain, threshold, "velocity correction clamped");
            correction
                .fixed_rows_mut::<3>(3)
                .scale_mut(threshold / velocity_gain);
            outcome = FilterOutcome::Breakdown;
        }

        let new_mean = pred_mean + correction;
        let new_covariance = pred_cov - kalman_gain * projected_cov * kalman_gain.transpose();
        FilterUpdate {
            mean: new_mean,
            covariance: (new_covariance + new_covariance.transpose()) * 0.5,
            outcome,
        }
    }
}

fn is_valid_step(dt: f64) -> bool {
    dt.is_finite() && dt > DT_EPSILON
}

/// Position part of a state vector.
pub fn position(mean: &StateVector) -> Point3<f64> {
    Point3::new(mean[0], mean[1], mean[2])
}

/// Velocity part of a state vector.
pub fn velocity(mean: &StateVector) -> Vector3<f64> {
    Vector3::new(mean[3], mean[4], mean[5])
}

/// Velocity block of a state covariance.
pub fn velocity_covariance(covariance: &StateCovariance) -> Matrix3<f64> {
    covariance.fixed_view::<3, 3>(3, 3).into_owned()
}
