//! Runtime subsystems

pub mod ahrs;
