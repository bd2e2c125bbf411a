//! AHRS estimator task
//!
//! Runs the quaternion EKF at a fixed rate (1 kHz by default), publishing an
//! [`AttitudeSnapshot`] to shared state after every cycle. Tuning comes from
//! [`SharedParameters`] and is re-applied whenever the store is modified.

use super::params::SharedParameters;
use super::state::{AhrsTelemetry, AttitudeSnapshot, SharedAttitudeState};
use gimbal_ahrs_core::parameters::AhrsParams;
use gimbal_ahrs_core::ahrs::{AttitudeEstimator, EstimatorConfig, EstimatorError, GateVerdict};
use nalgebra::Vector3;

/// Gaps longer than this many nominal periods fall back to the nominal dt
const MAX_GAP_PERIODS: u64 = 10;

/// IMU data from sensors
///
/// This is the interface between the IMU driver and the AHRS subsystem.
#[derive(Debug, Clone, Copy)]
pub struct ImuSample {
    /// Gyroscope reading in rad/s (body frame)
    pub gyro: Vector3<f32>,

    /// Accelerometer reading in m/s² (body frame, includes gravity)
    pub accel: Vector3<f32>,

    /// Timestamp in microseconds since startup
    pub timestamp_us: u64,
}

/// Accelerometer pre-filter applied before the estimator
pub trait AccelPrefilter {
    fn filter(&mut self, accel: Vector3<f32>) -> Vector3<f32>;
}

/// Identity pre-filter
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl AccelPrefilter for PassThrough {
    fn filter(&mut self, accel: Vector3<f32>) -> Vector3<f32> {
        accel
    }
}

/// AHRS task configuration
#[derive(Debug, Clone, Copy)]
pub struct AhrsTaskConfig {
    /// Estimator tuning
    pub estimator: EstimatorConfig,

    /// Loop rate in Hz (default: 1000)
    pub loop_rate_hz: u32,

    /// Status logging interval in cycles (default: 1000 = 1 second)
    pub log_interval: u32,
}

impl Default for AhrsTaskConfig {
    fn default() -> Self {
        Self {
            estimator: EstimatorConfig::default(),
            loop_rate_hz: 1000,
            log_interval: 1000,
        }
    }
}

impl AhrsTaskConfig {
    /// Default loop timing with the estimator tuned from `params`
    pub fn from_params(params: &AhrsParams) -> Self {
        Self {
            estimator: params.estimator_config(),
            ..Default::default()
        }
    }

    /// Nominal loop period in microseconds
    pub fn period_us(&self) -> u64 {
        1_000_000 / self.loop_rate_hz.max(1) as u64
    }

    /// Nominal loop period in seconds
    pub fn nominal_dt(&self) -> f32 {
        1.0 / self.loop_rate_hz.max(1) as f32
    }
}

/// Estimator plus the bookkeeping of the task loop
pub struct AhrsTaskState<P: AccelPrefilter = PassThrough> {
    estimator: AttitudeEstimator,
    prefilter: P,
    config: AhrsTaskConfig,
    last_timestamp_us: Option<u64>,
    telemetry: AhrsTelemetry,
    rejecting: bool,
}

impl AhrsTaskState<PassThrough> {
    pub fn new(config: AhrsTaskConfig) -> Result<Self, EstimatorError> {
        Self::with_prefilter(config, PassThrough)
    }
}

impl<P: AccelPrefilter> AhrsTaskState<P> {
    pub fn with_prefilter(config: AhrsTaskConfig, prefilter: P) -> Result<Self, EstimatorError> {
        Ok(Self {
            estimator: AttitudeEstimator::new(config.estimator)?,
            prefilter,
            config,
            last_timestamp_us: None,
            telemetry: AhrsTelemetry::default(),
            rejecting: false,
        })
    }

    /// Time step for a sample stamped `timestamp_us`
    ///
    /// The first sample, a non-increasing timestamp or a gap of more than
    /// ten periods all use the nominal period.
    fn time_step(&mut self, timestamp_us: u64) -> f32 {
        let max_gap = MAX_GAP_PERIODS * self.config.period_us();
        let dt = match self.last_timestamp_us {
            Some(prev) if timestamp_us > prev && timestamp_us - prev <= max_gap => {
                (timestamp_us - prev) as f32 * 1e-6
            }
            _ => self.config.nominal_dt(),
        };
        self.last_timestamp_us = Some(timestamp_us);
        dt
    }

    /// Run one estimator cycle on `sample`
    pub fn process(&mut self, sample: &ImuSample) -> Result<AttitudeSnapshot, EstimatorError> {
        let dt = self.time_step(sample.timestamp_us);
        let accel = self.prefilter.filter(sample.accel);

        let estimate = match self.estimator.update(sample.gyro, accel, dt) {
            Ok(estimate) => estimate,
            Err(e) => {
                self.telemetry.dropped_samples = self.telemetry.dropped_samples.saturating_add(1);
                crate::log_warn!("AHRS sample dropped: {}", e.as_str());
                return Err(e);
            }
        };

        let t = &mut self.telemetry;
        t.cycles = t.cycles.wrapping_add(1);
        match estimate.gate {
            Some(GateVerdict::Reject) => {
                t.gate_rejections = t.gate_rejections.saturating_add(1);
                if !self.rejecting {
                    self.rejecting = true;
                    crate::log_debug!("AHRS gate rejecting, score {}", estimate.gate_score);
                }
            }
            Some(GateVerdict::ForceAccept) => {
                t.forced_accepts = t.forced_accepts.saturating_add(1);
                self.rejecting = false;
                crate::log_warn!(
                    "AHRS gate forced acceptance after {} rejections",
                    self.config.estimator.max_gate_failures
                );
            }
            _ => self.rejecting = false,
        }
        if let Some(fault) = estimate.fault {
            t.numerical_faults = t.numerical_faults.saturating_add(1);
            crate::log_warn!("AHRS numerical fault: {}", fault.as_str());
        }

        Ok(AttitudeSnapshot {
            estimate,
            timestamp_us: sample.timestamp_us,
            telemetry: self.telemetry,
        })
    }

    /// Count a control period that found no sample
    pub fn record_missed(&mut self) {
        self.telemetry.missed_samples = self.telemetry.missed_samples.saturating_add(1);
    }

    /// Re-tune the running estimator
    ///
    /// The attitude is kept. Invalid parameters leave the current tuning in place.
    pub fn apply_params(&mut self, params: &AhrsParams) -> Result<(), EstimatorError> {
        if !params.is_valid() {
            return Err(EstimatorError::InvalidConfig);
        }
        let estimator = params.estimator_config();
        self.estimator.reconfigure(estimator)?;
        self.config.estimator = estimator;
        self.rejecting = false;
        Ok(())
    }

    /// Reset the estimator and forget the timestamp history
    ///
    /// Counters are kept.
    pub fn reset(&mut self) -> Result<(), EstimatorError> {
        self.estimator.reset()?;
        self.last_timestamp_us = None;
        self.rejecting = false;
        Ok(())
    }

    pub fn estimator(&self) -> &AttitudeEstimator {
        &self.estimator
    }

    pub fn telemetry(&self) -> AhrsTelemetry {
        self.telemetry
    }

    pub fn config(&self) -> &AhrsTaskConfig {
        &self.config
    }

    fn log_status(&self) {
        let estimate = self.estimator.estimate();
        crate::log_debug!(
            "AHRS: {} cycles, roll={} pitch={} deg, rejects={} missed={}",
            self.telemetry.cycles,
            estimate.roll_deg(),
            estimate.pitch_deg(),
            self.telemetry.gate_rejections,
            self.telemetry.missed_samples
        );
    }
}

/// Apply pending parameter changes
fn sync_params<P: AccelPrefilter>(task_state: &mut AhrsTaskState<P>, params: &SharedParameters) {
    let Some(changed) = params.take_ahrs_changes() else {
        return;
    };
    match task_state.apply_params(&changed) {
        Ok(()) => crate::log_info!(
            "AHRS parameters applied: R={} chi={} maxf={}",
            changed.r_accel,
            changed.chi_threshold,
            changed.chi_max_failures
        ),
        Err(e) => crate::log_warn!("AHRS parameters ignored: {}", e.as_str()),
    }
}

/// Process one sample and publish the result
///
/// Returns `false` if the estimator refused the sample.
fn step<P: AccelPrefilter>(
    task_state: &mut AhrsTaskState<P>,
    shared_state: &SharedAttitudeState,
    sample: Option<ImuSample>,
) -> bool {
    let Some(sample) = sample else {
        task_state.record_missed();
        return true;
    };

    match task_state.process(&sample) {
        Ok(snapshot) => {
            shared_state.write(snapshot);
            let interval = task_state.config.log_interval;
            if interval > 0 && snapshot.telemetry.cycles % interval == 0 {
                task_state.log_status();
            }
            true
        }
        Err(_) => false,
    }
}

/// AHRS task entry point driven by an async sample source
///
/// `imu_reader` yields one sample per control period, or `None` when the
/// period produced no sample. Never returns once the estimator is built.
///
/// # Arguments
///
/// * `shared_state` - Shared attitude state to publish results
/// * `params` - Parameter store; its AHRS values replace `config.estimator`
/// * `config` - AHRS task configuration
/// * `imu_reader` - Async function to read IMU data
///
/// # Example (conceptual)
///
/// ```ignore
/// #[embassy_executor::task]
/// async fn ahrs_task(
///     state: &'static SharedAttitudeState,
///     params: &'static SharedParameters,
///     imu: Icm42688,
/// ) {
///     let config = AhrsTaskConfig::default();
///     let _ = run_ahrs_task(state, params, config, || async { imu.read().await.ok() }).await;
/// }
/// ```
pub async fn run_ahrs_task<F, Fut>(
    shared_state: &SharedAttitudeState,
    params: &SharedParameters,
    config: AhrsTaskConfig,
    mut imu_reader: F,
) -> Result<(), EstimatorError>
where
    F: FnMut() -> Fut,
    Fut: ::core::future::Future<Output = Option<ImuSample>>,
{
    let mut task_state = AhrsTaskState::new(initial_config(params, config))?;
    crate::log_info!("AHRS task started at {} Hz", config.loop_rate_hz);

    loop {
        sync_params(&mut task_state, params);
        let sample = imu_reader().await;
        step(&mut task_state, shared_state, sample);
    }
}

/// `config` with the estimator tuned from the current store contents
fn initial_config(params: &SharedParameters, config: AhrsTaskConfig) -> AhrsTaskConfig {
    params.take_ahrs_changes();
    AhrsTaskConfig {
        estimator: params.ahrs().estimator_config(),
        ..config
    }
}

/// Fixed-rate AHRS loop draining a [`super::stage::SampleStage`]
///
/// Ticks at `config.loop_rate_hz` with an embassy `Ticker`; the IMU driver
/// publishes into `stage` from its own context. Parameter changes are picked
/// up at the start of the next tick.
#[cfg(feature = "embassy")]
pub async fn run_ahrs_ticker<P: AccelPrefilter>(
    shared_state: &SharedAttitudeState,
    stage: &super::stage::SampleStage,
    params: &SharedParameters,
    config: AhrsTaskConfig,
    prefilter: P,
) -> Result<(), EstimatorError> {
    use embassy_time::{Duration, Instant, Ticker};

    let mut task_state = AhrsTaskState::with_prefilter(initial_config(params, config), prefilter)?;
    let mut ticker = Ticker::every(Duration::from_micros(config.period_us()));

    let mut cycle_count: u32 = 0;
    let mut total_latency_us: u64 = 0;
    let mut max_latency_us: u64 = 0;

    crate::log_info!("AHRS ticker started at {} Hz", config.loop_rate_hz);

    loop {
        ticker.next().await;
        let start = Instant::now();

        sync_params(&mut task_state, params);
        step(&mut task_state, shared_state, stage.take());

        let latency = start.elapsed().as_micros();
        total_latency_us += latency;
        max_latency_us = max_latency_us.max(latency);
        cycle_count += 1;

        if config.log_interval > 0 && cycle_count >= config.log_interval {
            crate::log_debug!(
                "AHRS loop: {} cycles, avg={}us, max={}us",
                cycle_count,
                total_latency_us / cycle_count as u64,
                max_latency_us
            );
            cycle_count = 0;
            total_latency_us = 0;
            max_latency_us = 0;
        }
    }
}
