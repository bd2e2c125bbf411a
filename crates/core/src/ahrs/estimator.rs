//! Attitude estimator façade
//!
//! Owns one quaternion EKF and turns raw gyro/accelerometer samples into an
//! [`AttitudeEstimate`] each tick:
//!
//! 1. Remove the estimated roll/pitch gyro bias
//! 2. Decide gate eligibility from motion quality: gating is enabled when
//!    the body rotates fast or the accelerometer magnitude is off gravity
//! 3. Load the gyro-driven transition `A = I + ½·dt·Ω(ω)`, `Q` and `R`
//! 4. Stage the normalized accelerometer and run the filter
//! 5. Publish quaternion, bias, rotation matrix and Euler angles
//!
//! Lifecycle: construction initializes the filter (identity attitude, zero
//! bias). The first successful [`AttitudeEstimator::update`] moves it to
//! [`EstimatorPhase::Running`], where it stays.

use super::chi_square::{ChiSquareGate, DEFAULT_MAX_FAILURES, DEFAULT_THRESHOLD};
use super::fast_math::fast_inv_sqrt;
use super::quaternion_ekf::{
    QuaternionEkf, QuaternionEkfHooks, CONTROL_SIZE, MEASUREMENT_SIZE, STATE_SIZE,
};
use super::traits::AttitudeEstimate;
use crate::kalman::{KalmanError, Mat, MatrixError, SkipSteps};
use nalgebra::{Quaternion, Vector2, Vector3};

/// Local gravity magnitude (m/s²)
pub const DEFAULT_GRAVITY: f32 = 9.8035;

/// Estimator tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorConfig {
    /// Process noise density of the quaternion states (scaled by dt)
    pub process_noise_quat: f32,

    /// Process noise density of the bias states (scaled by dt)
    pub process_noise_bias: f32,

    /// Accelerometer measurement noise (R diagonal)
    pub measurement_noise: f32,

    /// Chi-square gate threshold
    pub gate_threshold: f32,

    /// Consecutive rejections before the gate force-accepts
    pub max_gate_failures: u32,

    /// Expected accelerometer magnitude at rest (m/s²)
    pub gravity: f32,

    /// Angular rate above which gating is enabled (rad/s)
    pub gate_gyro_rate: f32,

    /// Accelerometer deviation from gravity above which gating is enabled (m/s²)
    pub gate_accel_band: f32,

    /// Max bias correction per second (rad/s per s)
    pub bias_step_limit: f32,

    /// Bound on the bias variances
    pub bias_variance_limit: f32,

    /// Initial quaternion variance
    pub initial_quat_variance: f32,

    /// Initial bias variance
    pub initial_bias_variance: f32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            process_noise_quat: 10.0,
            process_noise_bias: 0.001,
            measurement_noise: 1e6,
            gate_threshold: DEFAULT_THRESHOLD,
            max_gate_failures: DEFAULT_MAX_FAILURES,
            gravity: DEFAULT_GRAVITY,
            gate_gyro_rate: 0.3,
            gate_accel_band: 0.5,
            bias_step_limit: 1e-2,
            bias_variance_limit: 1e4,
            initial_quat_variance: 1e5,
            initial_bias_variance: 1e2,
        }
    }
}

impl EstimatorConfig {
    /// Check that every tunable is finite and in its domain
    pub fn is_valid(&self) -> bool {
        let positive = |v: f32| v.is_finite() && v > 0.0;
        let non_negative = |v: f32| v.is_finite() && v >= 0.0;

        non_negative(self.process_noise_quat)
            && non_negative(self.process_noise_bias)
            && positive(self.measurement_noise)
            && positive(self.gate_threshold)
            && self.max_gate_failures > 0
            && positive(self.gravity)
            && non_negative(self.gate_gyro_rate)
            && non_negative(self.gate_accel_band)
            && non_negative(self.bias_step_limit)
            && non_negative(self.bias_variance_limit)
            && positive(self.initial_quat_variance)
            && positive(self.initial_bias_variance)
    }
}

/// Estimator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorPhase {
    /// Seeded, no sample processed yet
    Initialized,
    /// Steady-state update loop
    Running,
}

/// Estimator errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorError {
    /// Tuning value is non-finite or out of its domain
    InvalidConfig,
    /// Filter could not be constructed
    Filter(KalmanError),
    /// Staging the measurement failed
    Numerical(MatrixError),
    /// Sample contains NaN or infinity
    NonFiniteSample,
    /// Time step is not a positive finite number
    InvalidTimeStep,
}

impl EstimatorError {
    /// Return variant name as a static string (usable with defmt on embedded)
    pub fn as_str(&self) -> &'static str {
        match self {
            EstimatorError::InvalidConfig => "InvalidConfig",
            EstimatorError::Filter(_) => "Filter",
            EstimatorError::Numerical(_) => "Numerical",
            EstimatorError::NonFiniteSample => "NonFiniteSample",
            EstimatorError::InvalidTimeStep => "InvalidTimeStep",
        }
    }
}

impl core::fmt::Display for EstimatorError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EstimatorError::InvalidConfig => write!(f, "invalid estimator configuration"),
            EstimatorError::Filter(e) => write!(f, "filter construction failed: {}", e),
            EstimatorError::Numerical(e) => write!(f, "numerical fault: {}", e),
            EstimatorError::NonFiniteSample => write!(f, "non-finite IMU sample"),
            EstimatorError::InvalidTimeStep => write!(f, "invalid time step"),
        }
    }
}

impl From<KalmanError> for EstimatorError {
    fn from(e: KalmanError) -> Self {
        EstimatorError::Filter(e)
    }
}

impl From<MatrixError> for EstimatorError {
    fn from(e: MatrixError) -> Self {
        EstimatorError::Numerical(e)
    }
}

/// Quaternion EKF attitude estimator
#[derive(Debug, Clone)]
pub struct AttitudeEstimator {
    config: EstimatorConfig,
    ekf: QuaternionEkf,
    phase: EstimatorPhase,
    estimate: AttitudeEstimate,
    gating_enabled: bool,
}

impl AttitudeEstimator {
    /// Create an estimator seeded at identity attitude and zero bias
    pub fn new(config: EstimatorConfig) -> Result<Self, EstimatorError> {
        if !config.is_valid() {
            return Err(EstimatorError::InvalidConfig);
        }
        let mut ekf = QuaternionEkf::new(
            STATE_SIZE,
            CONTROL_SIZE,
            MEASUREMENT_SIZE,
            build_hooks(&config),
        )?;
        seed(&mut ekf, &config);

        Ok(Self {
            config,
            ekf,
            phase: EstimatorPhase::Initialized,
            estimate: AttitudeEstimate::default(),
            gating_enabled: false,
        })
    }

    /// Re-initialize the filter, discarding all history
    pub fn reset(&mut self) -> Result<(), EstimatorError> {
        self.ekf.init(STATE_SIZE, CONTROL_SIZE, MEASUREMENT_SIZE)?;
        *self.ekf.hooks_mut() = build_hooks(&self.config);
        seed(&mut self.ekf, &self.config);
        self.phase = EstimatorPhase::Initialized;
        self.estimate = AttitudeEstimate::default();
        self.gating_enabled = false;
        Ok(())
    }

    /// Replace the tuning without discarding the attitude
    ///
    /// Noise terms and gating limits apply from the next update. The gate
    /// restarts unconverged; the covariance seeds only matter on reset.
    pub fn reconfigure(&mut self, config: EstimatorConfig) -> Result<(), EstimatorError> {
        if !config.is_valid() {
            return Err(EstimatorError::InvalidConfig);
        }
        let dt = self.ekf.hooks().dt();
        let hooks = self.ekf.hooks_mut();
        *hooks = build_hooks(&config);
        hooks.set_dt(dt);
        self.config = config;
        Ok(())
    }

    /// Process one IMU sample
    ///
    /// # Arguments
    ///
    /// * `gyro` - Angular rate in rad/s (body frame)
    /// * `accel` - Specific force in m/s² (body frame, includes gravity)
    /// * `dt` - Time since the previous sample in seconds
    pub fn update(
        &mut self,
        gyro: Vector3<f32>,
        accel: Vector3<f32>,
        dt: f32,
    ) -> Result<AttitudeEstimate, EstimatorError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(EstimatorError::InvalidTimeStep);
        }
        if gyro.iter().chain(accel.iter()).any(|v| !v.is_finite()) {
            return Err(EstimatorError::NonFiniteSample);
        }

        let config = &self.config;
        let rate = gyro - self.estimate.gyro_bias_3d();
        let accel_norm_sq = accel.norm_squared();
        let accel_inv_norm = fast_inv_sqrt(accel_norm_sq);
        let accel_norm = accel_norm_sq * accel_inv_norm;
        self.gating_enabled = rate.norm() >= config.gate_gyro_rate
            || libm::fabsf(accel_norm - config.gravity) >= config.gate_accel_band;

        let state = self.ekf.state_mut();
        load_transition(&mut state.a, &(rate * (0.5 * dt)));
        state.q.fill(0.0);
        for i in 0..STATE_SIZE {
            state.q[(i, i)] = if i < 4 {
                config.process_noise_quat * dt
            } else {
                config.process_noise_bias * dt
            };
        }
        state.r.fill(0.0);
        state.r.fill_diagonal(config.measurement_noise);
        let z = accel * accel_inv_norm;
        state.stage_measurement(z.as_slice())?;

        let hooks = self.ekf.hooks_mut();
        hooks.set_dt(dt);
        hooks.gate_mut().set_enabled(self.gating_enabled);

        self.ekf.update();

        let x = self.ekf.output();
        let mut estimate = AttitudeEstimate::from_quaternion(Quaternion::new(x[0], x[1], x[2], x[3]));
        estimate.gyro_bias = Vector2::new(x[4], x[5]);
        let hooks = self.ekf.hooks();
        estimate.gate = hooks.verdict();
        estimate.gate_converged = hooks.gate().is_accepted();
        estimate.gate_score = hooks.gate().score();
        estimate.fault = self.ekf.last_status().err();

        self.estimate = estimate;
        self.phase = EstimatorPhase::Running;
        Ok(estimate)
    }

    /// Snapshot of the last update
    pub fn estimate(&self) -> &AttitudeEstimate {
        &self.estimate
    }

    pub fn phase(&self) -> EstimatorPhase {
        self.phase
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Whether the last sample was judged disturbed (gate armed)
    pub fn gating_enabled(&self) -> bool {
        self.gating_enabled
    }

    pub fn gate(&self) -> &ChiSquareGate {
        self.ekf.hooks().gate()
    }

    /// Underlying filter (read-only)
    pub fn filter(&self) -> &QuaternionEkf {
        &self.ekf
    }

    /// Numerical faults since construction or reset
    pub fn fault_count(&self) -> u32 {
        self.ekf.state().fault_count()
    }
}

fn build_hooks(config: &EstimatorConfig) -> QuaternionEkfHooks {
    QuaternionEkfHooks::new(
        ChiSquareGate::new(config.gate_threshold, config.max_gate_failures),
        config.bias_step_limit,
        config.bias_variance_limit,
    )
}

fn seed(ekf: &mut QuaternionEkf, config: &EstimatorConfig) {
    let state = ekf.state_mut();
    state.skip = SkipSteps::GAIN | SkipSteps::CORRECT_STATE;
    state.x_hat[(0, 0)] = 1.0;
    state.a.fill_with_identity();
    for i in 0..STATE_SIZE {
        state.p[(i, i)] = if i < 4 {
            config.initial_quat_variance
        } else {
            config.initial_bias_variance
        };
    }
}

/// `A = I` with the quaternion block `I + Ω(h)`, `h = ½·dt·ω`
fn load_transition(a: &mut Mat, h: &Vector3<f32>) {
    let (hx, hy, hz) = (h.x, h.y, h.z);
    a.fill_with_identity();
    a[(0, 1)] = -hx;
    a[(0, 2)] = -hy;
    a[(0, 3)] = -hz;
    a[(1, 0)] = hx;
    a[(1, 2)] = hz;
    a[(1, 3)] = -hy;
    a[(2, 0)] = hy;
    a[(2, 1)] = -hz;
    a[(2, 3)] = hx;
    a[(3, 0)] = hz;
    a[(3, 1)] = hy;
    a[(3, 2)] = -hx;
}
