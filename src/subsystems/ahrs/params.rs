//! Parameter store shared with the AHRS task
//!
//! A ground link or console edits values through [`SharedParameters`]. The
//! estimator task checks the dirty flag once per cycle and re-tunes the
//! estimator when something changed.

use ::core::cell::RefCell;
use critical_section::Mutex;
use gimbal_ahrs_core::parameters::{AhrsParams, ParamValue, ParameterError, ParameterStore};

/// [`ParameterStore`] behind a critical-section mutex
pub struct SharedParameters {
    store: Mutex<RefCell<ParameterStore>>,
}

impl SharedParameters {
    pub fn new(store: ParameterStore) -> Self {
        Self {
            store: Mutex::new(RefCell::new(store)),
        }
    }

    /// Store holding the AHRS defaults
    pub fn with_ahrs_defaults() -> Result<Self, ParameterError> {
        let mut store = ParameterStore::new();
        AhrsParams::register_defaults(&mut store)?;
        Ok(Self::new(store))
    }

    pub fn get(&self, name: &str) -> Option<ParamValue> {
        critical_section::with(|cs| self.store.borrow_ref(cs).get(name).copied())
    }

    pub fn set(&self, name: &str, value: ParamValue) -> Result<(), ParameterError> {
        critical_section::with(|cs| self.store.borrow_ref_mut(cs).set(name, value))
    }

    /// Current AHRS parameters
    pub fn ahrs(&self) -> AhrsParams {
        critical_section::with(|cs| AhrsParams::from_store(&self.store.borrow_ref(cs)))
    }

    /// AHRS parameters if the store changed since the last call
    pub fn take_ahrs_changes(&self) -> Option<AhrsParams> {
        critical_section::with(|cs| {
            let mut store = self.store.borrow_ref_mut(cs);
            if store.take_dirty() {
                Some(AhrsParams::from_store(&store))
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_registered() {
        let params = SharedParameters::with_ahrs_defaults().unwrap();
        assert_eq!(params.get("AHRS_CHI_MAXF"), Some(ParamValue::Int(50)));
        assert_eq!(params.ahrs(), AhrsParams::default());
        assert!(params.get("AHRS_NOPE").is_none());
    }

    #[test]
    fn test_changes_taken_once() {
        let params = SharedParameters::with_ahrs_defaults().unwrap();
        // registration marks the store dirty
        assert!(params.take_ahrs_changes().is_some());
        assert!(params.take_ahrs_changes().is_none());

        params.set("AHRS_CHI_MAXF", ParamValue::Int(7)).unwrap();
        let changed = params.take_ahrs_changes().unwrap();
        assert_eq!(changed.chi_max_failures, 7);
        assert!(params.take_ahrs_changes().is_none());
    }

    #[test]
    fn test_rejected_set_leaves_store_clean() {
        let params = SharedParameters::with_ahrs_defaults().unwrap();
        params.take_ahrs_changes();

        assert_eq!(
            params.set("AHRS_CHI_MAXF", ParamValue::Float(3.0)),
            Err(ParameterError::TypeMismatch)
        );
        assert!(params.take_ahrs_changes().is_none());
    }
}
