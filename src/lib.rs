// Exploratory factor analysis: maximum-likelihood extraction and loading rotation

#![doc = include_str!("../README.md")]

pub mod error;
pub mod extraction;
pub mod linalg_backends;
pub mod matrix_ops;
pub mod rotation;

pub use error::{FactorError, Result};
pub use extraction::{ExtractionConfig, ExtractionOutput, FactorExtractor};
pub use rotation::{PromaxConfig, RotationOutput, Rotator, VarimaxConfig};

use ndarray::ArrayView2;

/// Maximum-likelihood extraction of `n_factors` factors from `data`
/// (n_samples × n_features) with default settings for everything except the
/// iteration budget, tolerance and seed.
///
/// See [`FactorExtractor::extract`] for the algorithm and error conditions.
pub fn extract(
    data: ArrayView2<f64>,
    n_factors: usize,
    max_iter: usize,
    tol: f64,
    seed: Option<u64>,
) -> Result<ExtractionOutput> {
    let config = ExtractionConfig {
        max_iter,
        tol,
        seed,
        ..Default::default()
    };
    FactorExtractor::new(config).extract(data, n_factors)
}

/// Varimax (`gamma = 1`), Quartimax (`gamma = 0`) or other orthomax rotation of
/// `loadings`. Returns the k × k orthonormal rotation matrix.
pub fn rotate_varimax(
    loadings: ArrayView2<f64>,
    gamma: f64,
    max_itr: usize,
    tol: f64,
) -> Result<RotationOutput> {
    let config = VarimaxConfig { gamma, max_itr, tol };
    Rotator::new().varimax(loadings, &config)
}

/// Promax rotation of `loadings`, built on a default Varimax rotation.
/// Returns the k × k oblique transform for the Varimax-rotated loadings.
pub fn rotate_promax(
    loadings: ArrayView2<f64>,
    kappa: f64,
    max_iter: usize,
    tol: f64,
) -> Result<RotationOutput> {
    let config = PromaxConfig {
        kappa,
        max_iter,
        tol,
        ..Default::default()
    };
    Rotator::new().promax(loadings, &config)
}
