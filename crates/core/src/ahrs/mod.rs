//! Attitude estimation
//!
//! Quaternion EKF specialization of the generic [`crate::kalman`] engine,
//! the chi-square innovation gate, and the [`AttitudeEstimator`] façade that
//! converts raw IMU samples into an [`AttitudeEstimate`].
//!
//! State vector: `[q0, q1, q2, q3, bx, by]` (unit quaternion plus roll/pitch
//! gyro bias). Measurement: normalized accelerometer vector.

pub mod chi_square;
pub mod estimator;
pub mod fast_math;
pub mod quaternion_ekf;
pub mod traits;

pub use chi_square::{ChiSquareGate, GateVerdict, DEFAULT_MAX_FAILURES, DEFAULT_THRESHOLD};
pub use estimator::{
    AttitudeEstimator, EstimatorConfig, EstimatorError, EstimatorPhase, DEFAULT_GRAVITY,
};
pub use fast_math::fast_inv_sqrt;
pub use quaternion_ekf::{gravity_direction, QuaternionEkf, QuaternionEkfHooks};
pub use traits::{quaternion_to_euler, quaternion_to_rotation, AttitudeEstimate};
