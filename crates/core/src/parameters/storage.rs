//! Parameter Storage Types
//!
//! Named tuning values kept in a fixed-capacity map, so the store lives
//! without a heap on the target. Every accepted write raises a dirty flag;
//! the owner of the values derived from the store (the AHRS task) polls it
//! and re-applies the parameters.

use super::error::ParameterError;
use bitflags::bitflags;
use heapless::index_map::FnvIndexMap;
use heapless::String;

/// Maximum parameter name length
pub const PARAM_NAME_LEN: usize = 16;

/// Maximum number of parameters
pub const MAX_PARAMS: usize = 32;

bitflags! {
    /// Parameter flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ParamFlags: u8 {
        /// Parameter cannot be modified after registration
        const READ_ONLY = 0b00000001;
    }
}

/// Parameter value types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    /// 32-bit signed integer
    Int(i32),
    /// 32-bit floating point
    Float(f32),
}

impl ParamValue {
    /// Get type discriminant
    pub fn type_id(&self) -> u8 {
        match self {
            ParamValue::Bool(_) => 1,
            ParamValue::Int(_) => 2,
            ParamValue::Float(_) => 3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: ParamValue,
    flags: ParamFlags,
}

type Name = String<PARAM_NAME_LEN>;

fn name_of(name: &str) -> Result<Name, ParameterError> {
    let mut key = Name::new();
    key.push_str(name)
        .map_err(|_| ParameterError::InvalidConfig)?;
    Ok(key)
}

/// Named parameter values with flags and a dirty bit
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    entries: FnvIndexMap<Name, Entry, MAX_PARAMS>,
    dirty: bool,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value, `None` for unknown names
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.get(&name_of(name).ok()?).map(|e| &e.value)
    }

    /// Overwrite a registered parameter
    ///
    /// The value must keep the type the parameter was registered with.
    pub fn set(&mut self, name: &str, value: ParamValue) -> Result<(), ParameterError> {
        let entry = self
            .entries
            .get_mut(&name_of(name)?)
            .ok_or(ParameterError::InvalidConfig)?;
        if entry.flags.contains(ParamFlags::READ_ONLY) {
            return Err(ParameterError::ReadOnly);
        }
        if entry.value.type_id() != value.type_id() {
            return Err(ParameterError::TypeMismatch);
        }

        entry.value = value;
        self.dirty = true;
        Ok(())
    }

    /// Register a parameter with its default value
    ///
    /// Registering an existing name keeps the current value.
    pub fn register(
        &mut self,
        name: &str,
        default_value: ParamValue,
        flags: ParamFlags,
    ) -> Result<(), ParameterError> {
        let key = name_of(name)?;
        if self.entries.contains_key(&key) {
            return Ok(());
        }

        self.entries
            .insert(
                key,
                Entry {
                    value: default_value,
                    flags,
                },
            )
            .map_err(|_| ParameterError::StoreFull)?;
        self.dirty = true;
        Ok(())
    }

    /// Whether values changed since the last [`ParameterStore::take_dirty`]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Read and clear the dirty flag
    pub fn take_dirty(&mut self) -> bool {
        ::core::mem::replace(&mut self.dirty, false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
