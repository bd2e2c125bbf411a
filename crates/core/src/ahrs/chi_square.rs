//! Chi-square innovation gate
//!
//! Scores each correction by `νᵀ·S⁻¹·ν` (ν = innovation) and decides whether
//! to accept, attenuate or reject it. The bands are fixed fractions of the
//! configured threshold:
//!
//! | score | gate converged | gating enabled | verdict |
//! |---|---|---|---|
//! | `< 0.5·th` | marks converged | - | continue below |
//! | `> th` | yes | yes | reject, or force-accept after `max_failures` |
//! | `> th` | yes | no | accept, scale 1 |
//! | `(0.1·th, th]` | yes | - | accept, scale `(th - score) / (0.9·th)` |
//! | otherwise | - | - | accept, scale 1 |
//!
//! A force-accept clears the converged flag, so the gate stays open until
//! the score drops below `0.5·th` again.

/// Default threshold for the normalized-gravity measurement
pub const DEFAULT_THRESHOLD: f32 = 1e-8;

/// Default cap on consecutive rejections before the gate gives up
pub const DEFAULT_MAX_FAILURES: u32 = 50;

/// Fraction of the threshold below which the filter counts as converged
const CONVERGED_BAND: f32 = 0.5;

/// Fraction of the threshold above which corrections are attenuated
const ATTENUATION_BAND: f32 = 0.1;

/// Outcome of one gate evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateVerdict {
    /// Apply the correction scaled by `scale` (in `[0, 1]`)
    Accept { scale: f32 },
    /// Discard the correction and hold the prior for this cycle
    Reject,
    /// Too many consecutive rejections; accept at full scale and reopen
    ForceAccept,
}

impl GateVerdict {
    /// Return variant name as a static string (usable with defmt on embedded)
    pub fn as_str(&self) -> &'static str {
        match self {
            GateVerdict::Accept { .. } => "Accept",
            GateVerdict::Reject => "Reject",
            GateVerdict::ForceAccept => "ForceAccept",
        }
    }
}

/// Chi-square gate state
#[derive(Debug, Clone)]
pub struct ChiSquareGate {
    threshold: f32,
    max_failures: u32,
    consecutive_failures: u32,
    enabled: bool,
    accepted: bool,
    score: f32,
    rejections: u32,
    forced_accepts: u32,
}

impl Default for ChiSquareGate {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_MAX_FAILURES)
    }
}

impl ChiSquareGate {
    pub fn new(threshold: f32, max_failures: u32) -> Self {
        Self {
            threshold,
            max_failures,
            consecutive_failures: 0,
            enabled: false,
            accepted: false,
            score: 0.0,
            rejections: 0,
            forced_accepts: 0,
        }
    }

    /// Enable or disable rejection for the coming cycle
    ///
    /// Set per tick by the caller from motion-quality heuristics.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the filter has been judged converged
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Rejections tolerated before a forced acceptance
    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Score of the last evaluation
    pub fn score(&self) -> f32 {
        self.score
    }

    /// Total rejected cycles
    pub fn rejections(&self) -> u32 {
        self.rejections
    }

    /// Total forced accepts
    pub fn forced_accepts(&self) -> u32 {
        self.forced_accepts
    }

    /// Evaluate one cycle's score
    pub fn evaluate(&mut self, score: f32) -> GateVerdict {
        self.score = score;
        let th = self.threshold;

        if score < CONVERGED_BAND * th {
            self.accepted = true;
        }

        if self.accepted && score > th {
            if !self.enabled {
                self.consecutive_failures = 0;
                return GateVerdict::Accept { scale: 1.0 };
            }

            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            if self.consecutive_failures <= self.max_failures {
                self.rejections = self.rejections.saturating_add(1);
                return GateVerdict::Reject;
            }

            self.accepted = false;
            self.consecutive_failures = 0;
            self.forced_accepts = self.forced_accepts.saturating_add(1);
            return GateVerdict::ForceAccept;
        }

        self.consecutive_failures = 0;
        if self.accepted && score > ATTENUATION_BAND * th {
            let scale = (th - score) / ((1.0 - ATTENUATION_BAND) * th);
            return GateVerdict::Accept { scale };
        }
        GateVerdict::Accept { scale: 1.0 }
    }
}
