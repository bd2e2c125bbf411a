//! Kalman engine error types
//!
//! `MatrixError` is the per-operation numerical status; `KalmanError` is the
//! construction-time configuration fault.

/// Status of a single matrix operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixError {
    /// Operand or output shapes are incompatible
    DimensionMismatch,
    /// Inversion failed or produced non-finite values
    Singular,
}

impl MatrixError {
    /// Return variant name as a static string (usable with defmt on embedded)
    pub fn as_str(&self) -> &'static str {
        match self {
            MatrixError::DimensionMismatch => "DimensionMismatch",
            MatrixError::Singular => "Singular",
        }
    }
}

impl core::fmt::Display for MatrixError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MatrixError::DimensionMismatch => write!(f, "matrix dimension mismatch"),
            MatrixError::Singular => write!(f, "matrix is singular"),
        }
    }
}

/// Result of a matrix operation
pub type MatrixResult = Result<(), MatrixError>;

/// Filter configuration faults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KalmanError {
    /// State or measurement size is zero
    InvalidDimensions {
        state: usize,
        measurement: usize,
    },
}

impl KalmanError {
    /// Return variant name as a static string (usable with defmt on embedded)
    pub fn as_str(&self) -> &'static str {
        match self {
            KalmanError::InvalidDimensions { .. } => "InvalidDimensions",
        }
    }
}

impl core::fmt::Display for KalmanError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            KalmanError::InvalidDimensions { state, measurement } => write!(
                f,
                "invalid filter dimensions: state={}, measurement={}",
                state, measurement
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_error_as_str() {
        assert_eq!(MatrixError::DimensionMismatch.as_str(), "DimensionMismatch");
        assert_eq!(MatrixError::Singular.as_str(), "Singular");
    }

    #[test]
    fn test_kalman_error_as_str() {
        let err = KalmanError::InvalidDimensions {
            state: 0,
            measurement: 3,
        };
        assert_eq!(err.as_str(), "InvalidDimensions");
    }
}
