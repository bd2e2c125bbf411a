//! Quaternion EKF on top of the Kalman engine
//!
//! State `x = [q0, q1, q2, q3, bx, by]`: attitude quaternion plus roll/pitch
//! gyro bias. Measurement `z`: accelerometer normalized to unit length,
//! compared against the gravity direction predicted by the quaternion.
//! No control input.
//!
//! The engine does the linear work (`x̂⁻ = A·x̂`, `P⁻ = A·P·Aᵀ + Q`,
//! `P = P⁻ - K·H·P⁻`). [`QuaternionEkfHooks`] supplies the nonlinear parts:
//!
//! - `after_predict_state`: renormalize the predicted quaternion, fill the
//!   bias columns of `A` (∂q̇/∂b), bound the bias variances
//! - `after_predict_covariance`: fill `H = ∂h/∂q`
//! - `after_gain`: replaces the gain and state-correction steps; computes
//!   the innovation against `h(x̂⁻)`, runs the [`ChiSquareGate`], reshapes
//!   the gain and commits `x̂ = x̂⁻ + K·ν`
//! - `on_cycle_end`: renormalize the corrected quaternion
//!
//! The yaw bias is not part of the state: rotation about gravity is
//! unobservable from the accelerometer.

use super::chi_square::{ChiSquareGate, GateVerdict};
use super::fast_math::fast_inv_sqrt;
use crate::kalman::{
    matrix, KalmanFilter, KalmanHooks, KalmanState, Mat, MatrixError, MatrixResult, SkipSteps,
};
use core::f32::consts::FRAC_PI_2;

/// Quaternion + 2-axis bias
pub const STATE_SIZE: usize = 6;

/// No control input
pub const CONTROL_SIZE: usize = 0;

/// Normalized accelerometer
pub const MEASUREMENT_SIZE: usize = 3;

/// Index of the first bias state
const BIAS: usize = 4;

/// Quaternion EKF: engine plus hooks
pub type QuaternionEkf = KalmanFilter<QuaternionEkfHooks>;

/// Gravity direction in the body frame predicted by `q`
///
/// This is the last row of the body-to-world rotation matrix.
pub fn gravity_direction(q: [f32; 4]) -> [f32; 3] {
    let [q0, q1, q2, q3] = q;
    [
        2.0 * (q1 * q3 - q0 * q2),
        2.0 * (q0 * q1 + q2 * q3),
        q0 * q0 - q1 * q1 - q2 * q2 + q3 * q3,
    ]
}

fn quaternion_of(x: &Mat) -> [f32; 4] {
    [x[(0, 0)], x[(1, 0)], x[(2, 0)], x[(3, 0)]]
}

/// `|limit|`, or no bound at all for NaN
fn magnitude_or_unbounded(limit: f32) -> f32 {
    if limit.is_nan() {
        f32::INFINITY
    } else {
        libm::fabsf(limit)
    }
}

/// Scale the quaternion block of a state vector to unit norm
///
/// A zero or non-finite quaternion is reseeded to identity.
fn normalize_quaternion(x: &mut Mat) {
    let norm_sq: f32 = (0..4).map(|i| x[(i, 0)] * x[(i, 0)]).sum();
    if norm_sq > f32::EPSILON && norm_sq.is_finite() {
        let inv_norm = fast_inv_sqrt(norm_sq);
        for i in 0..4 {
            x[(i, 0)] *= inv_norm;
        }
    } else {
        x.rows_mut(0, 4).copy_from_slice(&[1.0, 0.0, 0.0, 0.0]);
    }
}

/// Nonlinear hook bodies and per-cycle diagnostics of the quaternion EKF
#[derive(Debug, Clone)]
pub struct QuaternionEkfHooks {
    dt: f32,
    gate: ChiSquareGate,
    bias_step_limit: f32,
    bias_variance_limit: f32,
    predicted_gravity: [f32; 3],
    innovation: [f32; 3],
    axis_tilt: [f32; 3],
    correction: [f32; STATE_SIZE],
    verdict: Option<GateVerdict>,
}

impl QuaternionEkfHooks {
    /// # Arguments
    ///
    /// * `gate` - Innovation gate
    /// * `bias_step_limit` - Max bias correction per second of `dt`
    /// * `bias_variance_limit` - Bound on the bias diagonal of `P`
    ///
    /// A NaN limit disables the corresponding bound.
    pub fn new(gate: ChiSquareGate, bias_step_limit: f32, bias_variance_limit: f32) -> Self {
        Self {
            dt: 0.0,
            gate,
            bias_step_limit: magnitude_or_unbounded(bias_step_limit),
            bias_variance_limit: magnitude_or_unbounded(bias_variance_limit),
            predicted_gravity: [0.0; 3],
            innovation: [0.0; 3],
            axis_tilt: [FRAC_PI_2; 3],
            correction: [0.0; STATE_SIZE],
            verdict: None,
        }
    }

    /// Time step used by the Jacobians and the bias clamp
    pub fn set_dt(&mut self, dt: f32) {
        self.dt = dt;
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn gate(&self) -> &ChiSquareGate {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut ChiSquareGate {
        &mut self.gate
    }

    /// `h(x̂⁻)` of the last correction
    pub fn predicted_gravity(&self) -> [f32; 3] {
        self.predicted_gravity
    }

    /// `z - h(x̂⁻)` of the last correction
    pub fn innovation(&self) -> [f32; 3] {
        self.innovation
    }

    /// Angle between each body axis and the gravity line, in `[0, π/2]`
    ///
    /// `acos(|h_i|)`: π/2 when the axis is horizontal, 0 when vertical.
    pub fn axis_tilt(&self) -> [f32; 3] {
        self.axis_tilt
    }

    /// State increment committed by the last correction
    pub fn correction(&self) -> [f32; STATE_SIZE] {
        self.correction
    }

    /// Gate decision of the last cycle
    pub fn verdict(&self) -> Option<GateVerdict> {
        self.verdict
    }

    fn check_shapes(kf: &KalmanState) -> MatrixResult {
        let ok = kf.state_size() == STATE_SIZE
            && kf.measurement_size() == MEASUREMENT_SIZE
            && kf.x_hat.shape() == (STATE_SIZE, 1)
            && kf.x_hat_minus.shape() == (STATE_SIZE, 1)
            && kf.z.shape() == (MEASUREMENT_SIZE, 1)
            && kf.a.shape() == (STATE_SIZE, STATE_SIZE)
            && kf.p.shape() == (STATE_SIZE, STATE_SIZE)
            && kf.h.shape() == (MEASUREMENT_SIZE, STATE_SIZE)
            && kf.k.shape() == (STATE_SIZE, MEASUREMENT_SIZE)
            && kf
                .scratch
                .matrix
                .iter()
                .all(|m| m.nrows() >= STATE_SIZE && m.ncols() >= STATE_SIZE)
            && kf.scratch.vector.iter().all(|v| v.nrows() >= STATE_SIZE);
        if ok {
            Ok(())
        } else {
            Err(MatrixError::DimensionMismatch)
        }
    }
}

impl KalmanHooks for QuaternionEkfHooks {
    fn on_measurement(&mut self, _kf: &mut KalmanState) -> MatrixResult {
        self.verdict = None;
        self.correction = [0.0; STATE_SIZE];
        Ok(())
    }

    /// Predict Jacobian
    fn after_predict_state(&mut self, kf: &mut KalmanState) -> MatrixResult {
        Self::check_shapes(kf)?;

        normalize_quaternion(&mut kf.x_hat_minus);

        let [q0, q1, q2, q3] = quaternion_of(&kf.x_hat_minus);
        let h = 0.5 * self.dt;
        let a = &mut kf.a;
        a[(0, BIAS)] = h * q1;
        a[(0, BIAS + 1)] = h * q2;
        a[(1, BIAS)] = -h * q0;
        a[(1, BIAS + 1)] = h * q3;
        a[(2, BIAS)] = -h * q3;
        a[(2, BIAS + 1)] = -h * q0;
        a[(3, BIAS)] = h * q2;
        a[(3, BIAS + 1)] = -h * q1;

        let limit = self.bias_variance_limit;
        for i in BIAS..STATE_SIZE {
            kf.p[(i, i)] = kf.p[(i, i)].clamp(-limit, limit);
        }
        Ok(())
    }

    /// Measurement Jacobian
    fn after_predict_covariance(&mut self, kf: &mut KalmanState) -> MatrixResult {
        Self::check_shapes(kf)?;

        let [q0, q1, q2, q3] = quaternion_of(&kf.x_hat_minus);
        let rows = [
            [-q2, q3, -q0, q1],
            [q1, q0, q3, q2],
            [q0, -q1, -q2, q3],
        ];
        kf.h.fill(0.0);
        for (i, row) in rows.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                kf.h[(i, j)] = 2.0 * v;
            }
        }
        Ok(())
    }

    /// Gated nonlinear correction
    fn after_gain(&mut self, kf: &mut KalmanState) -> MatrixResult {
        Self::check_shapes(kf)?;
        let (n, p) = (STATE_SIZE, MEASUREMENT_SIZE);

        matrix::transpose(&kf.h, &mut kf.h_t)?;
        let [m0, m1] = &mut kf.scratch.matrix;
        {
            let mut hp = m0.view_mut((0, 0), (p, n));
            matrix::mul(&kf.h, &kf.p_minus, &mut hp)?;
            let mut hpht = m1.view_mut((0, 0), (p, p));
            matrix::mul(&hp, &kf.h_t, &mut hpht)?;
            matrix::add(&hpht, &kf.r, &mut kf.s)?;
        }
        let mut s_inv = m1.view_mut((0, 0), (p, p));
        matrix::invert(&kf.s, &mut s_inv)?;

        self.predicted_gravity = gravity_direction(quaternion_of(&kf.x_hat_minus));
        for i in 0..p {
            let g = self.predicted_gravity[i];
            self.innovation[i] = kf.z[(i, 0)] - g;
            self.axis_tilt[i] = libm::acosf(libm::fabsf(g).min(1.0));
        }

        let [v0, v1] = &mut kf.scratch.vector;
        let mut innovation = v1.view_mut((0, 0), (p, 1));
        innovation.copy_from_slice(&self.innovation);
        let mut weighted = v0.view_mut((0, 0), (p, 1));
        matrix::mul(&s_inv, &innovation, &mut weighted)?;
        let score = innovation.dot(&weighted);

        let verdict = self.gate.evaluate(score);
        self.verdict = Some(verdict);
        let scale = match verdict {
            GateVerdict::Reject => {
                kf.skip.insert(SkipSteps::CORRECT_COVARIANCE);
                return kf.hold_prior();
            }
            GateVerdict::Accept { scale } => scale,
            GateVerdict::ForceAccept => 1.0,
        };
        kf.skip.remove(SkipSteps::CORRECT_COVARIANCE);

        let mut pht = m0.view_mut((0, 0), (n, p));
        matrix::mul(&kf.p_minus, &kf.h_t, &mut pht)?;
        matrix::mul(&pht, &s_inv, &mut kf.k)?;
        kf.k *= scale;
        for (row, tilt) in [(BIAS, self.axis_tilt[0]), (BIAS + 1, self.axis_tilt[1])] {
            let weight = tilt / FRAC_PI_2;
            for col in 0..p {
                kf.k[(row, col)] *= weight;
            }
        }

        let mut delta = v0.view_mut((0, 0), (n, 1));
        matrix::mul(&kf.k, &innovation, &mut delta)?;
        if self.gate.is_accepted() {
            let limit = self.bias_step_limit * self.dt;
            for i in BIAS..STATE_SIZE {
                delta[(i, 0)] = delta[(i, 0)].clamp(-limit, limit);
            }
        }
        // q3 carries the yaw coupling; gravity cannot correct it
        delta[(3, 0)] = 0.0;

        for (i, c) in self.correction.iter_mut().enumerate() {
            *c = delta[(i, 0)];
        }
        matrix::add(&kf.x_hat_minus, &delta, &mut kf.x_hat)
    }

    /// Renormalize the corrected quaternion before it is published
    fn on_cycle_end(&mut self, kf: &mut KalmanState) -> MatrixResult {
        Self::check_shapes(kf)?;
        normalize_quaternion(&mut kf.x_hat);
        Ok(())
    }
}
