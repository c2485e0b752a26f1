// src/error.rs

use thiserror::Error;

/// Errors raised by the extraction and rotation solvers.
///
/// Failing to converge is not an error; it is reported through the `converged`
/// flag of the solver outputs so the caller can decide whether to retry.
#[derive(Debug, Error)]
pub enum FactorError {
    /// Malformed dimensions, detected before any iteration starts.
    #[error("shape error: {context}")]
    Shape { context: String },

    /// A matrix that must be inverted (or a diagonal that must be divided by) is singular.
    #[error("singular matrix in {matrix}: {detail}")]
    SingularMatrix {
        matrix: &'static str,
        detail: String,
    },

    /// SVD/LAPACK failure, or non-finite values produced mid-computation.
    #[error("numerical instability during {stage}: {detail}")]
    NumericalInstability {
        stage: &'static str,
        detail: String,
    },

    /// A tuning parameter is outside its admissible range.
    #[error("invalid parameter `{name}` = {value}: must be {constraint}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        constraint: &'static str,
    },
}

impl FactorError {
    pub(crate) fn shape(context: impl Into<String>) -> Self {
        FactorError::Shape {
            context: context.into(),
        }
    }

    pub(crate) fn invalid(name: &'static str, value: f64, constraint: &'static str) -> Self {
        FactorError::InvalidParameter {
            name,
            value: value.to_string(),
            constraint,
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, FactorError>;

/// Rejects tolerances that are negative or not finite. A tolerance of `0.0` is
/// allowed and means "never stop early".
pub(crate) fn check_tolerance(name: &'static str, tol: f64) -> Result<()> {
    if tol.is_finite() && tol >= 0.0 {
        Ok(())
    } else {
        Err(FactorError::invalid(name, tol, "finite and >= 0"))
    }
}
