//! Shared attitude state for inter-task communication
//!
//! The estimator task publishes an [`AttitudeSnapshot`] each cycle; the
//! gimbal controller and telemetry read it without blocking.

use gimbal_ahrs_core::ahrs::AttitudeEstimate;

/// Event counters maintained by the estimator task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AhrsTelemetry {
    /// Completed estimator cycles
    pub cycles: u32,

    /// Cycles whose correction was discarded by the innovation gate
    pub gate_rejections: u32,

    /// Times the gate gave up and force-accepted a correction
    pub forced_accepts: u32,

    /// Cycles that raised a numerical fault
    pub numerical_faults: u32,

    /// Control periods that found no fresh IMU sample
    pub missed_samples: u32,

    /// Samples refused by the estimator (bad timestamp or non-finite data)
    pub dropped_samples: u32,
}

/// Latest attitude with its timestamp and counters
#[derive(Debug, Clone, Copy)]
pub struct AttitudeSnapshot {
    pub estimate: AttitudeEstimate,

    /// Timestamp of the IMU sample behind the estimate (microseconds)
    pub timestamp_us: u64,

    pub telemetry: AhrsTelemetry,
}

impl AttitudeSnapshot {
    /// Check if the snapshot is younger than `max_age_us`
    pub fn is_fresh(&self, now_us: u64, max_age_us: u64) -> bool {
        now_us.saturating_sub(self.timestamp_us) < max_age_us
    }
}

/// Thread-safe holder of the latest snapshot
///
/// Uses critical sections for atomic read/write operations.
pub struct SharedAttitudeState {
    state: ::core::cell::UnsafeCell<Option<AttitudeSnapshot>>,
}

// Safety: access to the cell only happens inside critical sections.
unsafe impl Sync for SharedAttitudeState {}
unsafe impl Send for SharedAttitudeState {}

impl SharedAttitudeState {
    /// Create an empty shared state (no estimate yet)
    pub const fn new() -> Self {
        Self {
            state: ::core::cell::UnsafeCell::new(None),
        }
    }

    /// Read the latest snapshot, `None` before the first publish
    pub fn read(&self) -> Option<AttitudeSnapshot> {
        critical_section::with(|_cs| unsafe { *self.state.get() })
    }

    /// Replace the snapshot
    pub fn write(&self, snapshot: AttitudeSnapshot) {
        critical_section::with(|_cs| unsafe {
            *self.state.get() = Some(snapshot);
        });
    }

    /// Latest estimate only
    pub fn estimate(&self) -> Option<AttitudeEstimate> {
        self.read().map(|s| s.estimate)
    }

    /// Latest counters (zeroed before the first publish)
    pub fn telemetry(&self) -> AhrsTelemetry {
        self.read().map(|s| s.telemetry).unwrap_or_default()
    }

    /// Forget the published snapshot (estimator reset)
    pub fn clear(&self) {
        critical_section::with(|_cs| unsafe {
            *self.state.get() = None;
        });
    }
}

impl Default for SharedAttitudeState {
    fn default() -> Self {
        Self::new()
    }
}
