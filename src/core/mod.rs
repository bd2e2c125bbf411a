//! Core runtime infrastructure

pub mod logging;
