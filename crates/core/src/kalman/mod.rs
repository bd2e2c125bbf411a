//! Generic Kalman filter engine
//!
//! Fixed-shape, init-time allocated filter with optional control input,
//! optional forgetting-factor adaptive noise, and hook slots that let an
//! application replace any canonical update step (see [`KalmanHooks`]).
//!
//! # Modules
//!
//! - [`matrix`]: Shape-checked, non-allocating matrix primitives
//! - [`filter`]: Filter state and the update cycle
//! - [`hooks`]: Extension-point trait
//! - [`adaptive`]: Adaptive `R`/`Q` estimation
//! - [`error`]: Matrix and configuration faults

pub mod adaptive;
pub mod error;
pub mod filter;
pub mod hooks;
pub mod matrix;

pub use adaptive::AdaptiveNoise;
pub use error::{KalmanError, MatrixError, MatrixResult};
pub use filter::{KalmanFilter, KalmanState, Scratch, SkipSteps};
pub use hooks::{KalmanHooks, NoHooks};
pub use matrix::Mat;
