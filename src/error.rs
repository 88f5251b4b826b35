//! Error taxonomy shared by every public operation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FluidError>;

#[derive(Error, Debug)]
pub enum FluidError {
    /// The pressure solve ran out of iterations before meeting its tolerance.
    #[error(
        "pressure solve did not converge after {iterations} iterations \
         (residual {residual:.3e}, threshold {threshold:.3e}, unconverged batch elements {failed:?})"
    )]
    Convergence {
        iterations: usize,
        residual: f64,
        threshold: f64,
        failed: Vec<usize>,
    },

    #[error("shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("invalid mask in {context}: value {value} is outside [0, 1]")]
    InvalidMask { context: &'static str, value: f64 },

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl FluidError {
    pub(crate) fn shape(context: &'static str, expected: &[usize], found: &[usize]) -> Self {
        FluidError::ShapeMismatch {
            context,
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}
