// src/matrix_ops.rs

//! Dense primitives shared by the extraction and rotation solvers.
//!
//! Everything here is pure and works in `f64`. LAPACK calls go through
//! [`NdarrayLinAlgBackend`]; its boxed errors are mapped into [`FactorError`] so
//! callers only ever see the crate's error taxonomy.

use crate::error::{FactorError, Result};
use crate::linalg_backends::{BackendInverse, BackendSVD, NdarrayLinAlgBackend};
use ndarray::{Array1, Array2, ArrayBase, ArrayView2, Axis, Data, Dimension};

/// Matrices whose estimated reciprocal condition number falls below this are
/// treated as singular.
pub const SINGULARITY_RCOND: f64 = f64::EPSILON;

/// Full singular value decomposition `M = U · diag(s) · Vᵀ`.
#[derive(Debug, Clone)]
pub struct SvdParts {
    pub u: Array2<f64>,
    pub s: Array1<f64>,
    pub vt: Array2<f64>,
}

/// Column-centred covariance `Xcᵀ·Xc / (n − ddof)` of a samples × features matrix.
///
/// `ddof = 0` gives the maximum-likelihood estimate used by extraction.
///
/// # Errors
/// `Shape` if there are fewer than 2 samples, no features, or `ddof >= n_samples`;
/// `NumericalInstability` if the data contains NaN or infinity.
pub fn covariance(data: ArrayView2<f64>, ddof: usize) -> Result<Array2<f64>> {
    let (n_samples, n_features) = data.dim();
    if n_features == 0 {
        return Err(FactorError::shape("data matrix has zero features"));
    }
    if n_samples < 2 {
        return Err(FactorError::shape(format!(
            "covariance needs at least 2 samples, got {}",
            n_samples
        )));
    }
    if ddof >= n_samples {
        return Err(FactorError::shape(format!(
            "ddof ({}) must be smaller than the number of samples ({})",
            ddof, n_samples
        )));
    }
    ensure_finite(&data, "covariance input")?;

    let mean = data
        .mean_axis(Axis(0))
        .ok_or_else(|| FactorError::shape("failed to compute column means"))?;
    let centered = &data - &mean;
    let mut cov = centered.t().dot(&centered);
    cov /= (n_samples - ddof) as f64;
    Ok(cov)
}

/// Full SVD of `matrix`.
///
/// # Errors
/// `NumericalInstability` if the input is not finite or LAPACK fails to converge.
pub fn svd(matrix: &Array2<f64>) -> Result<SvdParts> {
    ensure_finite(matrix, "svd input")?;
    let out = NdarrayLinAlgBackend
        .svd_into(matrix.to_owned(), true, true)
        .map_err(|e| FactorError::NumericalInstability {
            stage: "svd",
            detail: e.to_string(),
        })?;
    match (out.u, out.vt) {
        (Some(u), Some(vt)) => Ok(SvdParts { u, s: out.s, vt }),
        _ => Err(FactorError::NumericalInstability {
            stage: "svd",
            detail: "backend did not return singular vectors".to_string(),
        }),
    }
}

/// Inverse of a square matrix. `what` names the matrix in the error.
///
/// # Errors
/// `Shape` for non-square input, `SingularMatrix` when the LU factorization
/// fails or the reciprocal condition number is below [`SINGULARITY_RCOND`],
/// `NumericalInstability` for non-finite input or output.
pub fn inverse(matrix: &Array2<f64>, what: &'static str) -> Result<Array2<f64>> {
    if !matrix.is_square() {
        return Err(FactorError::shape(format!(
            "{} must be square to invert, got {:?}",
            what,
            matrix.dim()
        )));
    }
    ensure_finite(matrix, what)?;
    let out = NdarrayLinAlgBackend
        .inverse_with_rcond(matrix)
        .map_err(|e| FactorError::SingularMatrix {
            matrix: what,
            detail: e.to_string(),
        })?;
    if !(out.rcond >= SINGULARITY_RCOND) {
        return Err(FactorError::SingularMatrix {
            matrix: what,
            detail: format!("reciprocal condition number {:e}", out.rcond),
        });
    }
    ensure_finite(&out.inverse, what)?;
    Ok(out.inverse)
}

/// Main diagonal of a (possibly non-square) matrix.
pub fn diag(matrix: &Array2<f64>) -> Array1<f64> {
    matrix.diag().to_owned()
}

/// Square diagonal matrix built from a vector.
pub fn undiag(values: &Array1<f64>) -> Array2<f64> {
    Array2::from_diag(values)
}

/// `max |a − b|` over all entries; `0.0` for empty arrays.
pub fn max_abs_diff<S1, S2, D>(a: &ArrayBase<S1, D>, b: &ArrayBase<S2, D>) -> f64
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension,
{
    a.iter()
        .zip(b.iter())
        .fold(0.0_f64, |acc, (x, y)| acc.max((x - y).abs()))
}

/// Fails with `NumericalInstability` if any entry is NaN or infinite.
pub fn ensure_finite<S, D>(array: &ArrayBase<S, D>, stage: &'static str) -> Result<()>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    match array.iter().position(|v| !v.is_finite()) {
        None => Ok(()),
        Some(flat_idx) => Err(FactorError::NumericalInstability {
            stage,
            detail: format!("non-finite value at flat index {}", flat_idx),
        }),
    }
}
