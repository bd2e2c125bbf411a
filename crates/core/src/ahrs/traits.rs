//! Attitude output types
//!
//! The estimator publishes an [`AttitudeEstimate`] snapshot every cycle.
//! Rotation matrix and Euler angles are derived from the quaternion and are
//! never fed back into the filter.
//!
//! # Coordinate System
//!
//! - Quaternion: scalar-first (q0, q1, q2, q3), body to world
//! - World z axis points up; a level, resting accelerometer reads `[0, 0, +g]`
//! - Euler sequence: ZYX (yaw-pitch-roll)

use super::chi_square::GateVerdict;
use crate::kalman::MatrixError;
use nalgebra::{Matrix3, Quaternion, Vector2, Vector3};

/// Attitude snapshot produced by one estimator cycle
#[derive(Debug, Clone, Copy)]
pub struct AttitudeEstimate {
    /// Attitude quaternion (scalar-first)
    pub quaternion: Quaternion<f32>,

    /// Estimated gyro bias on the roll and pitch axes (rad/s)
    pub gyro_bias: Vector2<f32>,

    /// Body-to-world rotation matrix
    pub rotation: Matrix3<f32>,

    /// Yaw angle in radians
    pub yaw: f32,

    /// Pitch angle in radians
    pub pitch: f32,

    /// Roll angle in radians
    pub roll: f32,

    /// Gate decision of this cycle, `None` if the gate was not reached
    pub gate: Option<GateVerdict>,

    /// Whether the innovation gate considers the filter converged
    pub gate_converged: bool,

    /// Innovation score seen by the gate
    pub gate_score: f32,

    /// Numerical fault raised during this cycle
    pub fault: Option<MatrixError>,
}

impl Default for AttitudeEstimate {
    fn default() -> Self {
        Self {
            quaternion: Quaternion::identity(),
            gyro_bias: Vector2::zeros(),
            rotation: Matrix3::identity(),
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            gate: None,
            gate_converged: false,
            gate_score: 0.0,
            fault: None,
        }
    }
}

impl AttitudeEstimate {
    /// Build a snapshot from a quaternion, deriving rotation and Euler angles
    pub fn from_quaternion(q: Quaternion<f32>) -> Self {
        let (yaw, pitch, roll) = quaternion_to_euler(&q);
        Self {
            quaternion: q,
            rotation: quaternion_to_rotation(&q),
            yaw,
            pitch,
            roll,
            ..Default::default()
        }
    }

    /// Quaternion as `[q0, q1, q2, q3]`
    pub fn quat(&self) -> [f32; 4] {
        let q = &self.quaternion;
        [q.w, q.i, q.j, q.k]
    }

    /// Euler angles as `[yaw, pitch, roll]`
    pub fn euler(&self) -> [f32; 3] {
        [self.yaw, self.pitch, self.roll]
    }

    /// Three-axis gyro bias with the unestimated yaw term zero
    pub fn gyro_bias_3d(&self) -> Vector3<f32> {
        Vector3::new(self.gyro_bias.x, self.gyro_bias.y, 0.0)
    }

    /// Check if the quaternion is a unit quaternion within 1%
    pub fn is_valid(&self) -> bool {
        libm::fabsf(self.quaternion.norm() - 1.0) < 0.01
    }

    /// No numerical fault this cycle
    pub fn is_healthy(&self) -> bool {
        self.fault.is_none()
    }

    /// The gate discarded this cycle's correction
    pub fn is_gate_rejected(&self) -> bool {
        self.gate == Some(GateVerdict::Reject)
    }

    pub fn yaw_deg(&self) -> f32 {
        self.yaw.to_degrees()
    }

    pub fn pitch_deg(&self) -> f32 {
        self.pitch.to_degrees()
    }

    pub fn roll_deg(&self) -> f32 {
        self.roll.to_degrees()
    }
}

/// Convert quaternion to Euler angles (ZYX convention)
///
/// Returns (yaw, pitch, roll) in radians. The pitch argument is clamped so
/// a slightly non-unit quaternion near ±90° pitch cannot produce NaN.
pub fn quaternion_to_euler(q: &Quaternion<f32>) -> (f32, f32, f32) {
    let (q0, q1, q2, q3) = (q.w, q.i, q.j, q.k);
    let yaw = libm::atan2f(
        2.0 * (q0 * q3 + q1 * q2),
        2.0 * (q0 * q0 + q1 * q1) - 1.0,
    );
    let pitch = libm::asinf((-2.0 * (q1 * q3 - q0 * q2)).clamp(-1.0, 1.0));
    let roll = libm::atan2f(
        2.0 * (q0 * q1 + q2 * q3),
        2.0 * (q0 * q0 + q3 * q3) - 1.0,
    );
    (yaw, pitch, roll)
}

/// Body-to-world rotation matrix of a unit quaternion
pub fn quaternion_to_rotation(q: &Quaternion<f32>) -> Matrix3<f32> {
    let (q0, q1, q2, q3) = (q.w, q.i, q.j, q.k);
    Matrix3::new(
        1.0 - 2.0 * (q2 * q2 + q3 * q3),
        2.0 * (q1 * q2 - q0 * q3),
        2.0 * (q1 * q3 + q0 * q2),
        2.0 * (q1 * q2 + q0 * q3),
        1.0 - 2.0 * (q1 * q1 + q3 * q3),
        2.0 * (q2 * q3 - q0 * q1),
        2.0 * (q1 * q3 - q0 * q2),
        2.0 * (q2 * q3 + q0 * q1),
        1.0 - 2.0 * (q1 * q1 + q2 * q2),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use core::f32::consts::{FRAC_1_SQRT_2, PI};
    use nalgebra::UnitQuaternion;

    const EPSILON: f32 = 0.001;

    #[test]
    fn test_estimate_default() {
        let est = AttitudeEstimate::default();
        assert_eq!(est.quat(), [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(est.euler(), [0.0, 0.0, 0.0]);
        assert_eq!(est.rotation, Matrix3::identity());
        assert!(est.is_valid());
        assert!(est.is_healthy());
        assert!(!est.is_gate_rejected());
    }

    #[test]
    fn test_euler_known_values() {
        // 90 degree roll
        let est = AttitudeEstimate::from_quaternion(Quaternion::new(
            FRAC_1_SQRT_2,
            FRAC_1_SQRT_2,
            0.0,
            0.0,
        ));
        assert!((est.roll - PI / 2.0).abs() < EPSILON);
        assert!(est.pitch.abs() < EPSILON);
        assert!(est.yaw.abs() < EPSILON);

        // 90 degree yaw
        let est = AttitudeEstimate::from_quaternion(Quaternion::new(
            FRAC_1_SQRT_2,
            0.0,
            0.0,
            FRAC_1_SQRT_2,
        ));
        assert!(est.roll.abs() < EPSILON);
        assert!(est.pitch.abs() < EPSILON);
        assert!((est.yaw - PI / 2.0).abs() < EPSILON);

        // 30 degree pitch
        let half = PI / 12.0;
        let est = AttitudeEstimate::from_quaternion(Quaternion::new(
            libm::cosf(half),
            0.0,
            libm::sinf(half),
            0.0,
        ));
        assert!(est.roll.abs() < EPSILON);
        assert!((est.pitch - PI / 6.0).abs() < EPSILON);
        assert!(est.yaw.abs() < EPSILON);
    }

    #[test]
    fn test_euler_matches_nalgebra() {
        let test_angles = [
            (0.1, 0.2, 0.3),
            (-0.5, 0.25, 0.75),
            (PI / 4.0, PI / 6.0, PI / 3.0),
        ];

        for (roll, pitch, yaw) in test_angles {
            let uq = UnitQuaternion::from_euler_angles(roll, pitch, yaw);
            let (y, p, r) = quaternion_to_euler(uq.quaternion());
            assert!((r - roll).abs() < EPSILON, "roll {} vs {}", r, roll);
            assert!((p - pitch).abs() < EPSILON, "pitch {} vs {}", p, pitch);
            assert!((y - yaw).abs() < EPSILON, "yaw {} vs {}", y, yaw);
        }
    }

    #[test]
    fn test_pitch_clamped_for_non_unit_quaternion() {
        let q = Quaternion::new(0.72, 0.0, 0.72, 0.0);
        let (_, pitch, _) = quaternion_to_euler(&q);
        assert!(pitch.is_finite());
        assert!((pitch - PI / 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_rotation_matches_nalgebra() {
        let uq = UnitQuaternion::from_euler_angles(0.3_f32, -0.4, 1.1);
        let rotation = quaternion_to_rotation(uq.quaternion());
        assert_relative_eq!(rotation, *uq.to_rotation_matrix().matrix(), epsilon = 1e-5);
    }

    #[test]
    fn test_rotation_last_row_is_gravity_direction() {
        let uq = UnitQuaternion::from_euler_angles(0.2_f32, 0.1, 0.0);
        let rotation = quaternion_to_rotation(uq.quaternion());
        let world_up_in_body = uq.inverse() * Vector3::z();
        assert_relative_eq!(rotation.row(2).transpose(), world_up_in_body, epsilon = 1e-5);
    }

    #[test]
    fn test_degree_conversions() {
        let est = AttitudeEstimate {
            roll: PI / 2.0,
            pitch: PI / 4.0,
            yaw: -PI / 6.0,
            ..Default::default()
        };
        assert!((est.roll_deg() - 90.0).abs() < 0.01);
        assert!((est.pitch_deg() - 45.0).abs() < 0.01);
        assert!((est.yaw_deg() + 30.0).abs() < 0.01);
    }

    #[test]
    fn test_gyro_bias_3d() {
        let est = AttitudeEstimate {
            gyro_bias: Vector2::new(0.01, -0.02),
            ..Default::default()
        };
        assert_eq!(est.gyro_bias_3d(), Vector3::new(0.01, -0.02, 0.0));
    }
}
