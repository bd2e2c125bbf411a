//! Forgetting-factor adaptive noise covariance
//!
//! Re-estimates `R` and `Q` every cycle as exponentially-weighted blends of
//! their previous values and freshly observed sample covariances:
//!
//! ```text
//! e = z - x̂⁻           R ← α·R + (1-α)·(e·eᵀ + H·P⁻·Hᵀ)
//! r = z - x̂            Q ← α·Q + (1-α)·(K·r·rᵀ·Kᵀ)
//! α = 1 - (1-b) / (1 - b^(t+1))
//! ```
//!
//! `α` starts at 0 (first sample taken verbatim) and rises monotonically
//! toward the base `b` as `t` accumulates. Once within 0.001 of `b` it stops
//! moving.
//!
//! The residuals subtract a state vector from a measurement vector, so the
//! scheme only applies to filters whose state and measurement sizes match.

use super::error::MatrixResult;
use super::matrix::{self, Mat, Operand};
use nalgebra::storage::Storage;
use nalgebra::Dyn;

/// Distance from the base at which alpha stops advancing
const ALPHA_SETTLE_BAND: f32 = 0.001;

/// Adaptive noise covariance state attached to one filter
#[derive(Debug, Clone)]
pub struct AdaptiveNoise {
    base: f32,
    alpha: f32,
    elapsed: f32,
    dt: f32,
    /// Prior residual `e` (p×1)
    prior_residual: Mat,
    /// Posterior residual `r` (p×1)
    posterior_residual: Mat,
    /// Transposed residual (1×p)
    residual_t: Mat,
    /// Transposed gain (p×n)
    gain_t: Mat,
    temp: [Mat; 2],
}

impl AdaptiveNoise {
    /// Create adaptive state for an `n`-state, `p`-measurement filter
    ///
    /// # Arguments
    ///
    /// * `base` - Forgetting-factor base `b`, in (0, 1)
    /// * `dt` - Time advanced per cycle
    pub fn new(state_size: usize, measurement_size: usize, base: f32, dt: f32) -> Self {
        let width = state_size.max(measurement_size);
        Self {
            base,
            alpha: 0.0,
            elapsed: 0.0,
            dt,
            prior_residual: Mat::zeros(measurement_size, 1),
            posterior_residual: Mat::zeros(measurement_size, 1),
            residual_t: Mat::zeros(1, measurement_size),
            gain_t: Mat::zeros(measurement_size, state_size),
            temp: [Mat::zeros(width, width), Mat::zeros(width, width)],
        }
    }

    /// Current blend weight
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Forgetting-factor base
    pub fn base(&self) -> f32 {
        self.base
    }

    /// Accumulated time
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Last prior residual `z - x̂⁻`
    pub fn prior_residual(&self) -> &Mat {
        &self.prior_residual
    }

    /// Last posterior residual `z - x̂`
    pub fn posterior_residual(&self) -> &Mat {
        &self.posterior_residual
    }

    /// Move alpha one `dt` step toward the base
    pub fn advance(&mut self) {
        if libm::fabsf(self.base - self.alpha) > ALPHA_SETTLE_BAND {
            let decay = libm::powf(self.base, self.elapsed + 1.0);
            self.alpha = 1.0 - (1.0 - self.base) / (1.0 - decay);
            self.elapsed += self.dt;
        }
    }

    /// `R ← α·R + (1-α)·(e·eᵀ + H·P⁻·Hᵀ)` with `e = z - x̂⁻`
    pub(crate) fn blend_measurement_noise<S>(
        &mut self,
        z: &Mat,
        x_hat_minus: &Mat,
        hpht: &Operand<S>,
        r: &mut Mat,
    ) -> MatrixResult
    where
        S: Storage<f32, Dyn, Dyn>,
    {
        let p = r.nrows();
        matrix::sub(z, x_hat_minus, &mut self.prior_residual)?;
        matrix::transpose(&self.prior_residual, &mut self.residual_t)?;

        let [t0, t1] = &mut self.temp;
        let mut outer = t0.view_mut((0, 0), (p, p));
        matrix::mul(&self.prior_residual, &self.residual_t, &mut outer)?;
        let mut sample = t1.view_mut((0, 0), (p, p));
        matrix::add(&outer, hpht, &mut sample)?;
        matrix::blend(r, &sample, self.alpha)
    }

    /// `Q ← α·Q + (1-α)·K·r·rᵀ·Kᵀ` with `r = z - x̂`
    pub(crate) fn blend_process_noise(
        &mut self,
        z: &Mat,
        x_hat: &Mat,
        k: &Mat,
        q: &mut Mat,
    ) -> MatrixResult {
        let n = q.nrows();
        let p = z.nrows();
        matrix::sub(z, x_hat, &mut self.posterior_residual)?;
        matrix::transpose(&self.posterior_residual, &mut self.residual_t)?;
        matrix::transpose(k, &mut self.gain_t)?;

        let [t0, t1] = &mut self.temp;
        let mut outer = t0.view_mut((0, 0), (p, p));
        matrix::mul(&self.posterior_residual, &self.residual_t, &mut outer)?;
        let mut weighted = t1.view_mut((0, 0), (n, p));
        matrix::mul(k, &outer, &mut weighted)?;
        let mut sample = t0.view_mut((0, 0), (n, n));
        matrix::mul(&weighted, &self.gain_t, &mut sample)?;
        matrix::blend(q, &sample, self.alpha)
    }
}
