// src/linalg_backends.rs

use ndarray::{Array1, Array2};
use ndarray_linalg::{Factorize, Inverse, ReciprocalConditionNum, SVDInto};
use std::error::Error;

/// A thread-safe boxed backend error, mapped into `FactorError` by `matrix_ops`.
pub type BackendError = Box<dyn Error + Send + Sync + 'static>;

/// Output of a Singular Value Decomposition.
#[derive(Debug)]
pub struct SVDOutput<F: 'static> {
    pub u: Option<Array2<F>>,
    pub s: Array1<F>,
    pub vt: Option<Array2<F>>,
}

/// Trait for Singular Value Decomposition.
pub trait BackendSVD<F: 'static + Copy + Send + Sync> {
    fn svd_into(&self, matrix: Array2<F>, compute_u: bool, compute_v: bool) -> Result<SVDOutput<F>, BackendError>;
}

/// Output of an LU-based inversion.
#[derive(Debug)]
pub struct InverseOutput<F: 'static> {
    /// The inverse of the input matrix.
    pub inverse: Array2<F>,
    /// Reciprocal 1-norm condition number estimated from the LU factors.
    /// Values near zero mean the inverse is numerically meaningless.
    pub rcond: F,
}

/// Trait for square-matrix inversion (LAPACK's GETRF/GECON/GETRI).
/// An exactly singular input is reported as an error by the factorization.
pub trait BackendInverse<F: 'static + Copy + Send + Sync> {
    fn inverse_with_rcond(&self, matrix: &Array2<F>) -> Result<InverseOutput<F>, BackendError>;
}

/// Dense LAPACK backend provided by `ndarray-linalg`.
/// The LAPACK implementation is chosen by the `backend_*` cargo features.
#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

// Helper to convert ndarray-linalg's error to a boxed error
fn to_dyn_error<E: Error + Send + Sync + 'static>(e: E) -> BackendError {
    Box::new(e)
}

impl BackendSVD<f64> for NdarrayLinAlgBackend {
    fn svd_into(&self, matrix: Array2<f64>, compute_u: bool, compute_v: bool) -> Result<SVDOutput<f64>, BackendError> {
        let (u, s, vt) = matrix.svd_into(compute_u, compute_v).map_err(to_dyn_error)?;
        Ok(SVDOutput { u, s, vt })
    }
}

impl BackendInverse<f64> for NdarrayLinAlgBackend {
    fn inverse_with_rcond(&self, matrix: &Array2<f64>) -> Result<InverseOutput<f64>, BackendError> {
        let lu = matrix.factorize().map_err(to_dyn_error)?;
        let rcond = lu.rcond().map_err(to_dyn_error)?;
        let inverse = lu.inv().map_err(to_dyn_error)?;
        Ok(InverseOutput { inverse, rcond })
    }
}
