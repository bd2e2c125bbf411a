//! gimbal_ahrs_core - Pure no_std attitude estimation for gimbal control
//!
//! This crate contains platform-agnostic algorithms and types
//! that can be tested on host without any feature flags or embassy dependencies.
//!
//! # Design Principles
//!
//! - **Zero cfg**: No `#[cfg(feature = ...)]` directives allowed
//! - **Pure no_std**: No std library dependencies (heap via `alloc` for matrices)
//! - **Hook abstractions**: Model-specific filter steps injected via traits
//!
//! # Modules
//!
//! - [`kalman`]: Generic linear Kalman engine with step hooks and adaptive noise
//! - [`ahrs`]: Quaternion EKF, chi-square gate and attitude estimator
//! - [`parameters`]: Parameter store and AHRS tuning parameters

#![no_std]

extern crate alloc;

pub mod ahrs;
pub mod kalman;
pub mod parameters;
