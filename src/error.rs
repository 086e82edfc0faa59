//! Error types shared across the spectral processing pipeline.
//!
//! Only failures that leave an operation with no meaningful output are errors
//! (length mismatches, empty input, unusable tunables). Numerical-quality
//! degradations — low-confidence calibrations, masked bands, non-convergent
//! fits — are encoded in the returned values instead, so the caller decides.

use thiserror::Error;

/// Errors raised by spectral operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpecError {
    /// x and y (or a derived channel) disagree in length.
    #[error("length mismatch: x has {x_len} samples but y has {y_len}")]
    LengthMismatch { x_len: usize, y_len: usize },

    /// A 2-D operation received data of the wrong shape.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// The named input was empty.
    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    /// A tunable was outside its valid range.
    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    /// A required dataset attribute was missing.
    #[error("missing dataset attribute: {0}")]
    MissingAttribute(&'static str),
}

pub type Result<T> = std::result::Result<T, SpecError>;

impl SpecError {
    /// Checks that two lengths agree, returning `LengthMismatch` otherwise.
    pub fn check_lengths(x_len: usize, y_len: usize) -> Result<()> {
        if x_len != y_len {
            return Err(SpecError::LengthMismatch { x_len, y_len });
        }
        Ok(())
    }

    /// Checks that a slice is non-empty.
    pub fn check_non_empty<T>(data: &[T], what: &'static str) -> Result<()> {
        if data.is_empty() {
            return Err(SpecError::EmptyInput(what));
        }
        Ok(())
    }
}
