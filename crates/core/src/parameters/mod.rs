//! Parameter management types and utilities
//!
//! A small named-parameter store plus the AHRS tuning block that loads an
//! [`crate::ahrs::EstimatorConfig`] from it. The AHRS task re-applies the
//! block whenever the store reports a change. Persistence is the caller's concern.

pub mod ahrs;
pub mod error;
pub mod storage;

pub use ahrs::AhrsParams;
pub use error::ParameterError;
pub use storage::{ParamFlags, ParamValue, ParameterStore};
pub use storage::{MAX_PARAMS, PARAM_NAME_LEN};
