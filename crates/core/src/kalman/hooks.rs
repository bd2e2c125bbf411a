//! Extension points of the Kalman engine
//!
//! A filter configuration customizes the engine by implementing
//! [`KalmanHooks`]. Each method fires at a fixed point of
//! [`KalmanFilter::update`](super::KalmanFilter::update) and receives the
//! whole filter state, so it may read anything computed so far and rewrite
//! any matrix before the next step consumes it. Pair a hook with the matching
//! [`SkipSteps`](super::SkipSteps) flag to replace a canonical step outright.
//!
//! Firing order within one cycle:
//!
//! ```text
//! ingest ─► on_measurement
//!        ─► predict state      ─► after_predict_state
//!        ─► predict covariance ─► after_predict_covariance
//!        ─► gain               ─► after_gain
//!        ─► correct state      ─► after_correct_state
//!        ─► correct covariance ─► after_correct_covariance
//!        ─► on_cycle_end ─► output
//! ```

use super::error::MatrixResult;
use super::filter::KalmanState;

/// Named hook slots, all defaulting to no-ops
///
/// Returning an error records it in the filter's last status. A
/// [`MatrixError::Singular`](super::MatrixError::Singular) returned from
/// [`after_gain`](KalmanHooks::after_gain) additionally makes the engine hold
/// the prior estimate for the rest of the cycle.
pub trait KalmanHooks {
    /// Slot 0: measurement ingested, nothing predicted yet
    fn on_measurement(&mut self, _kf: &mut KalmanState) -> MatrixResult {
        Ok(())
    }

    /// Slot 1: `x_hat_minus` available
    fn after_predict_state(&mut self, _kf: &mut KalmanState) -> MatrixResult {
        Ok(())
    }

    /// Slot 2: `p_minus` available
    fn after_predict_covariance(&mut self, _kf: &mut KalmanState) -> MatrixResult {
        Ok(())
    }

    /// Slot 3: `s` and `k` available
    fn after_gain(&mut self, _kf: &mut KalmanState) -> MatrixResult {
        Ok(())
    }

    /// Slot 4: posterior `x_hat` available
    fn after_correct_state(&mut self, _kf: &mut KalmanState) -> MatrixResult {
        Ok(())
    }

    /// Slot 5: posterior `p` available
    fn after_correct_covariance(&mut self, _kf: &mut KalmanState) -> MatrixResult {
        Ok(())
    }

    /// Slot 6: end of cycle, right before the output copy
    fn on_cycle_end(&mut self, _kf: &mut KalmanState) -> MatrixResult {
        Ok(())
    }
}

/// Plain linear Kalman filter
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl KalmanHooks for NoHooks {}
