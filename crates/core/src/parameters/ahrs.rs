//! AHRS Parameter Definitions
//!
//! Tuning values for the quaternion EKF attitude estimator.
//!
//! # Parameters
//!
//! - `AHRS_Q_QUAT` - Quaternion process noise density
//! - `AHRS_Q_BIAS` - Gyro bias process noise density
//! - `AHRS_R_ACCEL` - Accelerometer measurement noise
//! - `AHRS_CHI_THR` - Chi-square gate threshold
//! - `AHRS_CHI_MAXF` - Consecutive rejections before forced acceptance
//! - `AHRS_GRAVITY` - Local gravity magnitude (m/s²)
//! - `AHRS_GATE_GYRO` - Angular rate that arms the gate (rad/s)
//! - `AHRS_GATE_ACC` - Accelerometer deviation from gravity that arms the gate (m/s²)
//! - `AHRS_BIAS_STEP` - Max gyro bias correction per second

use super::error::ParameterError;
use super::storage::{ParamFlags, ParamValue, ParameterStore};
use crate::ahrs::EstimatorConfig;

const MIN_NOISE: f32 = 1e-9;
const MAX_NOISE: f32 = 1e9;

const MIN_THRESHOLD: f32 = 1e-12;
const MAX_THRESHOLD: f32 = 1e3;

const MIN_FAILURES: i32 = 1;
const MAX_FAILURES: i32 = 10_000;

const MIN_GRAVITY: f32 = 9.7;
const MAX_GRAVITY: f32 = 9.9;

const MAX_GATE_GYRO: f32 = 35.0;
const MAX_GATE_ACC: f32 = 50.0;
const MAX_BIAS_STEP: f32 = 1.0;

/// AHRS parameters loaded from parameter store
#[derive(Debug, Clone, PartialEq)]
pub struct AhrsParams {
    pub q_quat: f32,
    pub q_bias: f32,
    pub r_accel: f32,
    pub chi_threshold: f32,
    pub chi_max_failures: u32,
    pub gravity: f32,
    pub gate_gyro: f32,
    pub gate_accel: f32,
    pub bias_step: f32,
}

impl Default for AhrsParams {
    fn default() -> Self {
        let config = EstimatorConfig::default();
        Self {
            q_quat: config.process_noise_quat,
            q_bias: config.process_noise_bias,
            r_accel: config.measurement_noise,
            chi_threshold: config.gate_threshold,
            chi_max_failures: config.max_gate_failures,
            gravity: config.gravity,
            gate_gyro: config.gate_gyro_rate,
            gate_accel: config.gate_accel_band,
            bias_step: config.bias_step_limit,
        }
    }
}

fn float_param(store: &ParameterStore, name: &str, default: f32, min: f32, max: f32) -> f32 {
    match store.get(name) {
        Some(ParamValue::Float(v)) if v.is_finite() => v.clamp(min, max),
        Some(ParamValue::Int(v)) => (*v as f32).clamp(min, max),
        _ => default,
    }
}

impl AhrsParams {
    /// Register AHRS parameters with default values
    ///
    /// # Arguments
    ///
    /// * `store` - Parameter store to register parameters in
    pub fn register_defaults(store: &mut ParameterStore) -> Result<(), ParameterError> {
        let d = Self::default();
        let floats = [
            ("AHRS_Q_QUAT", d.q_quat),
            ("AHRS_Q_BIAS", d.q_bias),
            ("AHRS_R_ACCEL", d.r_accel),
            ("AHRS_CHI_THR", d.chi_threshold),
            ("AHRS_GRAVITY", d.gravity),
            ("AHRS_GATE_GYRO", d.gate_gyro),
            ("AHRS_GATE_ACC", d.gate_accel),
            ("AHRS_BIAS_STEP", d.bias_step),
        ];
        for (name, value) in floats {
            store.register(name, ParamValue::Float(value), ParamFlags::empty())?;
        }

        store.register(
            "AHRS_CHI_MAXF",
            ParamValue::Int(d.chi_max_failures as i32),
            ParamFlags::empty(),
        )?;

        Ok(())
    }

    /// Load AHRS parameters from parameter store
    ///
    /// Out-of-range values are clamped; missing or non-finite ones fall back to defaults.
    pub fn from_store(store: &ParameterStore) -> Self {
        let d = Self::default();

        let chi_max_failures = match store.get("AHRS_CHI_MAXF") {
            Some(ParamValue::Int(v)) => (*v).clamp(MIN_FAILURES, MAX_FAILURES) as u32,
            Some(ParamValue::Float(v)) if v.is_finite() => {
                (*v as i32).clamp(MIN_FAILURES, MAX_FAILURES) as u32
            }
            _ => d.chi_max_failures,
        };

        Self {
            q_quat: float_param(store, "AHRS_Q_QUAT", d.q_quat, MIN_NOISE, MAX_NOISE),
            q_bias: float_param(store, "AHRS_Q_BIAS", d.q_bias, MIN_NOISE, MAX_NOISE),
            r_accel: float_param(store, "AHRS_R_ACCEL", d.r_accel, MIN_NOISE, MAX_NOISE),
            chi_threshold: float_param(
                store,
                "AHRS_CHI_THR",
                d.chi_threshold,
                MIN_THRESHOLD,
                MAX_THRESHOLD,
            ),
            chi_max_failures,
            gravity: float_param(store, "AHRS_GRAVITY", d.gravity, MIN_GRAVITY, MAX_GRAVITY),
            gate_gyro: float_param(store, "AHRS_GATE_GYRO", d.gate_gyro, 0.0, MAX_GATE_GYRO),
            gate_accel: float_param(store, "AHRS_GATE_ACC", d.gate_accel, 0.0, MAX_GATE_ACC),
            bias_step: float_param(store, "AHRS_BIAS_STEP", d.bias_step, 0.0, MAX_BIAS_STEP),
        }
    }

    /// Validate AHRS parameters
    pub fn is_valid(&self) -> bool {
        let in_range = |v: f32, min: f32, max: f32| v.is_finite() && v >= min && v <= max;

        in_range(self.q_quat, MIN_NOISE, MAX_NOISE)
            && in_range(self.q_bias, MIN_NOISE, MAX_NOISE)
            && in_range(self.r_accel, MIN_NOISE, MAX_NOISE)
            && in_range(self.chi_threshold, MIN_THRESHOLD, MAX_THRESHOLD)
            && (MIN_FAILURES as u32..=MAX_FAILURES as u32).contains(&self.chi_max_failures)
            && in_range(self.gravity, MIN_GRAVITY, MAX_GRAVITY)
            && in_range(self.gate_gyro, 0.0, MAX_GATE_GYRO)
            && in_range(self.gate_accel, 0.0, MAX_GATE_ACC)
            && in_range(self.bias_step, 0.0, MAX_BIAS_STEP)
    }

    /// Estimator configuration for these parameters
    ///
    /// Covariance seeds and the bias variance bound keep their defaults.
    pub fn estimator_config(&self) -> EstimatorConfig {
        EstimatorConfig {
            process_noise_quat: self.q_quat,
            process_noise_bias: self.q_bias,
            measurement_noise: self.r_accel,
            gate_threshold: self.chi_threshold,
            max_gate_failures: self.chi_max_failures,
            gravity: self.gravity,
            gate_gyro_rate: self.gate_gyro,
            gate_accel_band: self.gate_accel,
            bias_step_limit: self.bias_step,
            ..EstimatorConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ahrs_params_defaults() {
        let params = AhrsParams::default();

        assert!((params.q_quat - 10.0).abs() < 1e-6);
        assert_eq!(params.chi_max_failures, 50);
        assert!((params.gravity - 9.8035).abs() < 1e-6);
        assert!(params.is_valid());
        assert_eq!(params.estimator_config(), EstimatorConfig::default());
    }

    #[test]
    fn test_register_defaults() {
        let mut store = ParameterStore::new();
        AhrsParams::register_defaults(&mut store).unwrap();

        assert_eq!(store.len(), 9);
        assert_eq!(store.get("AHRS_CHI_MAXF"), Some(&ParamValue::Int(50)));
        assert_eq!(AhrsParams::from_store(&store), AhrsParams::default());
    }

    #[test]
    fn test_from_store_overrides() {
        let mut store = ParameterStore::new();
        AhrsParams::register_defaults(&mut store).unwrap();
        store.set("AHRS_R_ACCEL", ParamValue::Float(5e5)).unwrap();
        store.set("AHRS_CHI_MAXF", ParamValue::Int(20)).unwrap();

        let params = AhrsParams::from_store(&store);
        assert!((params.r_accel - 5e5).abs() < 1.0);
        assert_eq!(params.chi_max_failures, 20);

        let config = params.estimator_config();
        assert_eq!(config.max_gate_failures, 20);
        assert_eq!(config.initial_quat_variance, 1e5);
    }

    #[test]
    fn test_from_store_clamps() {
        let mut store = ParameterStore::new();
        AhrsParams::register_defaults(&mut store).unwrap();
        store.set("AHRS_GRAVITY", ParamValue::Float(20.0)).unwrap();
        store.set("AHRS_CHI_MAXF", ParamValue::Int(-3)).unwrap();
        store.set("AHRS_Q_QUAT", ParamValue::Float(f32::NAN)).unwrap();

        let params = AhrsParams::from_store(&store);
        assert!((params.gravity - MAX_GRAVITY).abs() < 1e-6);
        assert_eq!(params.chi_max_failures, 1);
        assert!((params.q_quat - 10.0).abs() < 1e-6);
        assert!(params.is_valid());
    }

    #[test]
    fn test_from_empty_store() {
        let store = ParameterStore::new();
        assert_eq!(AhrsParams::from_store(&store), AhrsParams::default());
    }

    #[test]
    fn test_is_valid_rejects() {
        let params = AhrsParams {
            chi_max_failures: 0,
            ..AhrsParams::default()
        };
        assert!(!params.is_valid());

        let params = AhrsParams {
            r_accel: -1.0,
            ..AhrsParams::default()
        };
        assert!(!params.is_valid());
    }
}
