//! Kalman filter engine
//!
//! [`KalmanState`] owns every matrix of one filter instance, allocated once
//! at init. [`KalmanFilter`] pairs it with a [`KalmanHooks`] implementation
//! and runs the canonical cycle:
//!
//! 1. Ingest the staged measurement (and control) input
//! 2. Predict state: `x̂⁻ = A·x̂ (+ B·u)`
//! 3. Predict covariance: `P⁻ = A·P·Aᵀ + Q`
//! 4. Gain: `S = H·P⁻·Hᵀ + R`, `K = P⁻·Hᵀ·S⁻¹`
//! 5. Correct state: `x̂ = x̂⁻ + K·(z - H·x̂⁻)`
//! 6. Correct covariance: `P = P⁻ - K·H·P⁻`
//!
//! Steps 2-6 can each be skipped via [`SkipSteps`]. Matrix faults never abort
//! the cycle; they are recorded in [`KalmanFilter::last_status`]. A singular
//! innovation covariance holds the prior (`x̂ = x̂⁻`, `P = P⁻`) instead of
//! consuming an undefined inverse.

use super::adaptive::AdaptiveNoise;
use super::error::{KalmanError, MatrixError, MatrixResult};
use super::hooks::{KalmanHooks, NoHooks};
use super::matrix::{self, Mat};
use bitflags::bitflags;

bitflags! {
    /// Canonical steps that are replaced by hooks
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SkipSteps: u8 {
        const PREDICT_STATE = 0b0000_0001;
        const PREDICT_COVARIANCE = 0b0000_0010;
        const GAIN = 0b0000_0100;
        const CORRECT_STATE = 0b0000_1000;
        const CORRECT_COVARIANCE = 0b0001_0000;
    }
}

/// Instance-owned scratch arena
///
/// Buffers are `w×w` and `w×1` with `w = max(n, p)`. Steps take views of the
/// shape they need; independent product chains use different indices.
#[derive(Debug, Clone)]
pub struct Scratch {
    pub matrix: [Mat; 2],
    pub vector: [Mat; 2],
}

impl Scratch {
    fn new(width: usize) -> Self {
        Self {
            matrix: [Mat::zeros(width, width), Mat::zeros(width, width)],
            vector: [Mat::zeros(width, 1), Mat::zeros(width, 1)],
        }
    }
}

/// All matrices of one filter instance
///
/// Shapes are fixed at construction (n = state, m = control,
/// p = measurement). Fields are public so hooks can rewrite them between
/// steps; replacing a field with a differently shaped matrix is reported as
/// [`MatrixError::DimensionMismatch`] by the next step that uses it.
#[derive(Debug, Clone)]
pub struct KalmanState {
    state_size: usize,
    control_size: usize,
    measurement_size: usize,

    /// Posterior estimate (n×1)
    pub x_hat: Mat,
    /// Prior estimate (n×1)
    pub x_hat_minus: Mat,
    /// Control vector (m×1)
    pub u: Mat,
    /// Measurement vector (p×1)
    pub z: Mat,
    /// State transition (n×n)
    pub a: Mat,
    pub a_t: Mat,
    /// Control matrix (n×m)
    pub b: Mat,
    /// Measurement matrix (p×n)
    pub h: Mat,
    pub h_t: Mat,
    /// Posterior covariance (n×n)
    pub p: Mat,
    /// Prior covariance (n×n)
    pub p_minus: Mat,
    /// Process noise (n×n)
    pub q: Mat,
    /// Measurement noise (p×p)
    pub r: Mat,
    /// Gain (n×p)
    pub k: Mat,
    /// Innovation covariance (p×p)
    pub s: Mat,
    pub scratch: Scratch,

    /// Measurement staged for the next cycle (p×1), cleared on ingest
    pub measurement_input: Mat,
    /// Control staged for the next cycle (m×1)
    pub control_input: Mat,

    pub skip: SkipSteps,

    adaptive: Option<AdaptiveNoise>,
    output: Mat,
    status: MatrixResult,
    fault_count: u32,
    prior_held: bool,
}

impl KalmanState {
    /// Allocate a zero-filled state for an (n, m, p) filter
    pub fn new(
        state_size: usize,
        control_size: usize,
        measurement_size: usize,
    ) -> Result<Self, KalmanError> {
        if state_size == 0 || measurement_size == 0 {
            return Err(KalmanError::InvalidDimensions {
                state: state_size,
                measurement: measurement_size,
            });
        }

        let (n, m, p) = (state_size, control_size, measurement_size);
        Ok(Self {
            state_size: n,
            control_size: m,
            measurement_size: p,
            x_hat: Mat::zeros(n, 1),
            x_hat_minus: Mat::zeros(n, 1),
            u: Mat::zeros(m, 1),
            z: Mat::zeros(p, 1),
            a: Mat::zeros(n, n),
            a_t: Mat::zeros(n, n),
            b: Mat::zeros(n, m),
            h: Mat::zeros(p, n),
            h_t: Mat::zeros(n, p),
            p: Mat::zeros(n, n),
            p_minus: Mat::zeros(n, n),
            q: Mat::zeros(n, n),
            r: Mat::zeros(p, p),
            k: Mat::zeros(n, p),
            s: Mat::zeros(p, p),
            scratch: Scratch::new(n.max(p)),
            measurement_input: Mat::zeros(p, 1),
            control_input: Mat::zeros(m, 1),
            skip: SkipSteps::empty(),
            adaptive: None,
            output: Mat::zeros(n, 1),
            status: Ok(()),
            fault_count: 0,
            prior_held: false,
        })
    }

    /// State dimension n
    pub fn state_size(&self) -> usize {
        self.state_size
    }

    /// Control dimension m (0 = no control input)
    pub fn control_size(&self) -> usize {
        self.control_size
    }

    /// Measurement dimension p
    pub fn measurement_size(&self) -> usize {
        self.measurement_size
    }

    /// Attach forgetting-factor adaptive noise estimation
    pub fn enable_adaptive(&mut self, base: f32, dt: f32) {
        self.adaptive = Some(AdaptiveNoise::new(
            self.state_size,
            self.measurement_size,
            base,
            dt,
        ));
    }

    /// Adaptive noise state, if enabled
    pub fn adaptive(&self) -> Option<&AdaptiveNoise> {
        self.adaptive.as_ref()
    }

    /// Stage the measurement consumed by the next update
    pub fn stage_measurement(&mut self, values: &[f32]) -> MatrixResult {
        if values.len() != self.measurement_size {
            return Err(MatrixError::DimensionMismatch);
        }
        self.measurement_input.copy_from_slice(values);
        Ok(())
    }

    /// Stage the control input consumed by the next update
    pub fn stage_control(&mut self, values: &[f32]) -> MatrixResult {
        if values.len() != self.control_size {
            return Err(MatrixError::DimensionMismatch);
        }
        self.control_input.copy_from_slice(values);
        Ok(())
    }

    /// Discard this cycle's correction: `x̂ = x̂⁻`, `P = P⁻`
    ///
    /// The remaining canonical correction steps of the cycle are skipped.
    pub fn hold_prior(&mut self) -> MatrixResult {
        self.prior_held = true;
        matrix::copy(&self.x_hat_minus, &mut self.x_hat)?;
        matrix::copy(&self.p_minus, &mut self.p)
    }

    /// Whether the current cycle is holding the prior
    pub fn prior_held(&self) -> bool {
        self.prior_held
    }

    /// Copy of `x̂` taken at the end of the last update
    pub fn output(&self) -> &[f32] {
        self.output.as_slice()
    }

    /// Most recent fault of the last update, `Ok` if none
    pub fn last_status(&self) -> MatrixResult {
        self.status
    }

    /// Faults recorded since construction
    pub fn fault_count(&self) -> u32 {
        self.fault_count
    }

    fn record(&mut self, result: MatrixResult) {
        if let Err(e) = result {
            self.status = Err(e);
            self.fault_count = self.fault_count.saturating_add(1);
        }
    }

    fn ingest(&mut self) -> MatrixResult {
        matrix::copy(&self.measurement_input, &mut self.z)?;
        self.measurement_input.fill(0.0);
        if self.control_size > 0 {
            matrix::copy(&self.control_input, &mut self.u)?;
        }
        Ok(())
    }

    fn predict_state(&mut self) -> MatrixResult {
        let n = self.state_size;
        if self.control_size > 0 {
            let [v0, v1] = &mut self.scratch.vector;
            let mut ax = v0.view_mut((0, 0), (n, 1));
            matrix::mul(&self.a, &self.x_hat, &mut ax)?;
            let mut bu = v1.view_mut((0, 0), (n, 1));
            matrix::mul(&self.b, &self.u, &mut bu)?;
            matrix::add(&ax, &bu, &mut self.x_hat_minus)
        } else {
            matrix::mul(&self.a, &self.x_hat, &mut self.x_hat_minus)
        }
    }

    fn predict_covariance(&mut self) -> MatrixResult {
        let n = self.state_size;
        let p = self.measurement_size;

        matrix::transpose(&self.a, &mut self.a_t)?;
        {
            let [m0, m1] = &mut self.scratch.matrix;
            let mut ap = m0.view_mut((0, 0), (n, n));
            matrix::mul(&self.a, &self.p, &mut ap)?;
            let mut apat = m1.view_mut((0, 0), (n, n));
            matrix::mul(&ap, &self.a_t, &mut apat)?;
            matrix::add(&apat, &self.q, &mut self.p_minus)?;
        }

        if let Some(adaptive) = self.adaptive.as_mut() {
            matrix::transpose(&self.h, &mut self.h_t)?;
            let [m0, m1] = &mut self.scratch.matrix;
            let mut hp = m0.view_mut((0, 0), (p, n));
            matrix::mul(&self.h, &self.p_minus, &mut hp)?;
            let mut hpht = m1.view_mut((0, 0), (p, p));
            matrix::mul(&hp, &self.h_t, &mut hpht)?;
            adaptive.blend_measurement_noise(&self.z, &self.x_hat_minus, &hpht, &mut self.r)?;
        }
        Ok(())
    }

    fn compute_gain(&mut self) -> MatrixResult {
        let n = self.state_size;
        let p = self.measurement_size;

        matrix::transpose(&self.h, &mut self.h_t)?;
        let [m0, m1] = &mut self.scratch.matrix;
        {
            let mut hp = m0.view_mut((0, 0), (p, n));
            matrix::mul(&self.h, &self.p_minus, &mut hp)?;
            let mut hpht = m1.view_mut((0, 0), (p, p));
            matrix::mul(&hp, &self.h_t, &mut hpht)?;
            matrix::add(&hpht, &self.r, &mut self.s)?;
        }
        let mut s_inv = m1.view_mut((0, 0), (p, p));
        matrix::invert(&self.s, &mut s_inv)?;
        let mut pht = m0.view_mut((0, 0), (n, p));
        matrix::mul(&self.p_minus, &self.h_t, &mut pht)?;
        matrix::mul(&pht, &s_inv, &mut self.k)
    }

    fn correct_state(&mut self) -> MatrixResult {
        let n = self.state_size;
        let p = self.measurement_size;
        {
            let [v0, v1] = &mut self.scratch.vector;
            let mut hx = v0.view_mut((0, 0), (p, 1));
            matrix::mul(&self.h, &self.x_hat_minus, &mut hx)?;
            let mut innovation = v1.view_mut((0, 0), (p, 1));
            matrix::sub(&self.z, &hx, &mut innovation)?;
            let mut correction = v0.view_mut((0, 0), (n, 1));
            matrix::mul(&self.k, &innovation, &mut correction)?;
            matrix::add(&self.x_hat_minus, &correction, &mut self.x_hat)?;
        }

        if let Some(adaptive) = self.adaptive.as_mut() {
            adaptive.blend_process_noise(&self.z, &self.x_hat, &self.k, &mut self.q)?;
            adaptive.advance();
        }
        Ok(())
    }

    fn correct_covariance(&mut self) -> MatrixResult {
        let n = self.state_size;
        let [m0, m1] = &mut self.scratch.matrix;
        let mut kh = m0.view_mut((0, 0), (n, n));
        matrix::mul(&self.k, &self.h, &mut kh)?;
        let mut khp = m1.view_mut((0, 0), (n, n));
        matrix::mul(&kh, &self.p_minus, &mut khp)?;
        matrix::sub(&self.p_minus, &khp, &mut self.p)
    }
}

/// Kalman filter: state plus hook strategy
///
/// # Example
///
/// ```
/// use gimbal_ahrs_core::kalman::{KalmanFilter, NoHooks};
///
/// // 1-D constant estimator
/// let mut kf = KalmanFilter::new(1, 0, 1, NoHooks).unwrap();
/// let state = kf.state_mut();
/// state.a.fill(1.0);
/// state.h.fill(1.0);
/// state.p.fill(1.0);
/// state.r.fill(0.1);
///
/// for _ in 0..500 {
///     kf.state_mut().stage_measurement(&[2.0]).unwrap();
///     kf.update();
/// }
/// assert!((kf.output()[0] - 2.0).abs() < 1e-3);
/// ```
#[derive(Debug, Clone)]
pub struct KalmanFilter<H: KalmanHooks = NoHooks> {
    state: KalmanState,
    hooks: H,
}

impl<H: KalmanHooks> KalmanFilter<H> {
    /// Create an (n, m, p) filter with all matrices zeroed
    ///
    /// `A`, `H`, `Q`, `R` and the initial `P` must be populated before the
    /// first update, directly or from hooks.
    pub fn new(
        state_size: usize,
        control_size: usize,
        measurement_size: usize,
        hooks: H,
    ) -> Result<Self, KalmanError> {
        Ok(Self {
            state: KalmanState::new(state_size, control_size, measurement_size)?,
            hooks,
        })
    }

    /// Reallocate and zero every matrix
    ///
    /// Skip flags, adaptive state and status are reset as well; the hooks are
    /// kept.
    pub fn init(
        &mut self,
        state_size: usize,
        control_size: usize,
        measurement_size: usize,
    ) -> Result<(), KalmanError> {
        self.state = KalmanState::new(state_size, control_size, measurement_size)?;
        Ok(())
    }

    pub fn state(&self) -> &KalmanState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut KalmanState {
        &mut self.state
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// Copy of `x̂` from the last update
    pub fn output(&self) -> &[f32] {
        self.state.output()
    }

    /// Most recent fault of the last update
    pub fn last_status(&self) -> MatrixResult {
        self.state.last_status()
    }

    /// Run one filter cycle and return the new estimate
    pub fn update(&mut self) -> &[f32] {
        let Self { state: kf, hooks } = self;
        kf.status = Ok(());
        kf.prior_held = false;

        let result = kf.ingest();
        kf.record(result);
        let result = hooks.on_measurement(kf);
        kf.record(result);

        if !kf.skip.contains(SkipSteps::PREDICT_STATE) {
            let result = kf.predict_state();
            kf.record(result);
        }
        let result = hooks.after_predict_state(kf);
        kf.record(result);

        if !kf.skip.contains(SkipSteps::PREDICT_COVARIANCE) {
            let result = kf.predict_covariance();
            kf.record(result);
        }
        let result = hooks.after_predict_covariance(kf);
        kf.record(result);

        let mut gain = Ok(());
        if !kf.skip.contains(SkipSteps::GAIN) {
            gain = kf.compute_gain();
            kf.record(gain);
        }
        let hook = hooks.after_gain(kf);
        kf.record(hook);
        if gain == Err(MatrixError::Singular) || hook == Err(MatrixError::Singular) {
            let result = kf.hold_prior();
            kf.record(result);
        }

        if !kf.prior_held && !kf.skip.contains(SkipSteps::CORRECT_STATE) {
            let result = kf.correct_state();
            kf.record(result);
        }
        let result = hooks.after_correct_state(kf);
        kf.record(result);

        if !kf.prior_held && !kf.skip.contains(SkipSteps::CORRECT_COVARIANCE) {
            let result = kf.correct_covariance();
            kf.record(result);
        }
        let result = hooks.after_correct_covariance(kf);
        kf.record(result);

        let result = hooks.on_cycle_end(kf);
        kf.record(result);

        let result = matrix::copy(&kf.x_hat, &mut kf.output);
        kf.record(result);
        kf.output.as_slice()
    }
}
