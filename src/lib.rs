#![cfg_attr(not(test), no_std)]

//! gimbal_ahrs - Gimbal attitude estimation runtime
//!
//! Wires the platform-agnostic estimator from `gimbal_ahrs_core` into an
//! embedded control loop: IMU sample staging, the fixed-rate estimator task
//! and a shared attitude snapshot for the gimbal controller.

// Logging macros
pub mod core;

// Attitude estimation subsystem
pub mod subsystems;

pub use gimbal_ahrs_core as algorithms;
