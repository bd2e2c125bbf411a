//! AHRS (Attitude and Heading Reference System) runtime
//!
//! ```text
//!  IMU driver ──publish──▶ SampleStage ──take──▶ AhrsTaskState::process
//!                                                    │
//!                                      AttitudeEstimator (quaternion EKF)
//!  ground link ──set──▶ SharedParameters ──dirty──▶  │
//!                                                    │
//!  gimbal control ◀──read── SharedAttitudeState ◀────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use gimbal_ahrs::subsystems::ahrs::{run_ahrs_ticker, AhrsTaskConfig, PassThrough};
//!
//! static STAGE: SampleStage = SampleStage::new();
//! static ATTITUDE: SharedAttitudeState = SharedAttitudeState::new();
//!
//! #[embassy_executor::task]
//! async fn ahrs(params: &'static SharedParameters) {
//!     let config = AhrsTaskConfig::default();
//!     let _ = run_ahrs_ticker(&ATTITUDE, &STAGE, params, config, PassThrough).await;
//! }
//! ```

pub mod params;
pub mod stage;
pub mod state;
pub mod task;

pub use params::SharedParameters;
pub use stage::SampleStage;
pub use state::{AhrsTelemetry, AttitudeSnapshot, SharedAttitudeState};
pub use task::{run_ahrs_task, AccelPrefilter, AhrsTaskConfig, AhrsTaskState, ImuSample, PassThrough};

#[cfg(feature = "embassy")]
pub use task::run_ahrs_ticker;
