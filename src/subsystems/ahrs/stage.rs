//! IMU sample staging
//!
//! Single-slot mailbox between the IMU driver (interrupt or task context)
//! and the estimator loop. A newer sample overwrites a pending one; each
//! sample is taken at most once, so a period without a new sample reads as
//! `None`.

use super::task::ImuSample;

pub struct SampleStage {
    slot: ::core::cell::UnsafeCell<Option<ImuSample>>,
}

// Safety: access to the slot only happens inside critical sections.
unsafe impl Sync for SampleStage {}
unsafe impl Send for SampleStage {}

impl SampleStage {
    pub const fn new() -> Self {
        Self {
            slot: ::core::cell::UnsafeCell::new(None),
        }
    }

    /// Stage a sample, returning `true` if an unread sample was overwritten
    pub fn publish(&self, sample: ImuSample) -> bool {
        critical_section::with(|_cs| unsafe { (*self.slot.get()).replace(sample).is_some() })
    }

    /// Take the pending sample, if any
    pub fn take(&self) -> Option<ImuSample> {
        critical_section::with(|_cs| unsafe { (*self.slot.get()).take() })
    }

    pub fn is_pending(&self) -> bool {
        critical_section::with(|_cs| unsafe { (*self.slot.get()).is_some() })
    }
}

impl Default for SampleStage {
    fn default() -> Self {
        Self::new()
    }
}
