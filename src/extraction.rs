// src/extraction.rs

//! Maximum-likelihood factor extraction.
//!
//! The model is `x = Λ·z + ε` with `z ~ N(0, I_k)` and `ε ~ N(0, diag(ψ))`, so the
//! model-implied ("factor") covariance is `Σ = Λ·Λᵀ + diag(ψ)`. Starting from a
//! random (seeded) or caller-supplied guess, each iteration applies the EM update
//!
//! ```text
//! Σ⁻¹      = (Λ·Λᵀ + diag(ψ))⁻¹
//! β        = Λᵀ·Σ⁻¹                                  (k × p)
//! E[zzᵀ]   = I − β·Λ + β·S·βᵀ                        (k × k)
//! Λ_new    = S·βᵀ·E[zzᵀ]⁻¹ = S·Σ⁻¹·Λ·E[zzᵀ]⁻¹
//! ψ_new    = diag(S) − diag(Λ_new·β·S)
//! ```
//!
//! until both `Λ` and `ψ` move by less than `tol` (max-abs) or `max_iter` is used up.

use crate::error::{check_tolerance, FactorError, Result};
use crate::matrix_ops::{covariance, diag, ensure_finite, inverse, max_abs_diff, undiag};
use log::{debug, info, trace, warn};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::Uniform;
use serde::{Deserialize, Serialize};

/// Configuration for [`FactorExtractor`].
///
/// Every field has a default, so a partial serialized document (JSON, TOML, ...)
/// deserializes into a complete configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Hard upper bound on EM iterations.
    pub max_iter: usize,
    /// Convergence threshold on the max-abs change of both `Λ` and `ψ`.
    /// `0.0` disables early stopping.
    pub tol: f64,
    /// Seed for the random initial guess. `None` seeds from system entropy.
    pub seed: Option<u64>,
    /// Delta degrees of freedom for the sample covariance. `0` is the ML estimate.
    pub ddof: usize,
    /// Optional lower bound applied to `ψ` after every update.
    /// `None` leaves the update unconstrained, so uniquenesses may reach zero
    /// or go negative (Heywood cases) and later make `Σ` singular.
    pub uniqueness_floor: Option<f64>,
    /// Caller-supplied starting loadings, shape (n_features, n_factors).
    /// Overrides the random draw.
    pub initial_loadings: Option<Array2<f64>>,
    /// Caller-supplied starting uniquenesses, shape (n_features).
    /// Overrides the random draw.
    pub initial_uniquenesses: Option<Array1<f64>>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        ExtractionConfig {
            max_iter: 100,
            tol: 1e-5,
            seed: None,
            ddof: 0,
            uniqueness_floor: None,
            initial_loadings: None,
            initial_uniquenesses: None,
        }
    }
}

impl ExtractionConfig {
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_ddof(mut self, ddof: usize) -> Self {
        self.ddof = ddof;
        self
    }

    pub fn with_uniqueness_floor(mut self, floor: f64) -> Self {
        self.uniqueness_floor = Some(floor);
        self
    }

    /// Start from the given loadings and uniquenesses instead of a random draw.
    pub fn with_initial_guess(mut self, loadings: Array2<f64>, uniquenesses: Array1<f64>) -> Self {
        self.initial_loadings = Some(loadings);
        self.initial_uniquenesses = Some(uniquenesses);
        self
    }
}

/// Result of a maximum-likelihood extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// Factor loadings `Λ`.
    /// Shape: (n_features, n_factors)
    pub loadings: Array2<f64>,
    /// Unique variances `ψ`.
    /// Shape: (n_features)
    pub uniquenesses: Array1<f64>,
    /// Row-wise sum of squared loadings of the final `Λ`.
    /// Shape: (n_features)
    pub communality: Array1<f64>,
    /// `false` if `max_iter` was exhausted before both changes fell below `tol`.
    pub converged: bool,
    /// Number of EM updates that were applied.
    pub iterations: usize,
}

/// Maximum-likelihood factor extractor.
///
/// Holds only its configuration; every call to [`FactorExtractor::extract`] works on
/// private copies, so one extractor can be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct FactorExtractor {
    config: ExtractionConfig,
}

impl FactorExtractor {
    /// Creates a new extractor with the given configuration.
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Estimates `n_factors` factor loadings and the unique variances of `data`.
    ///
    /// * `data` - observations, shape (n_samples, n_features). Only read.
    /// * `n_factors` - number of latent factors, `1 <= n_factors < n_features`.
    ///
    /// # Errors
    /// - `Shape` for `n_factors` out of range, fewer than 2 samples, or initial
    ///   guesses of the wrong shape. Raised before iterating.
    /// - `InvalidParameter` for a negative/non-finite `tol` or `uniqueness_floor`.
    /// - `SingularMatrix` if the factor covariance or the factor second-moment
    ///   matrix cannot be inverted in some iteration.
    /// - `NumericalInstability` for non-finite input or intermediate values.
    pub fn extract(&self, data: ArrayView2<f64>, n_factors: usize) -> Result<ExtractionOutput> {
        let cfg = &self.config;
        let (n_samples, n_features) = data.dim();

        if n_factors == 0 || n_factors >= n_features {
            return Err(FactorError::shape(format!(
                "n_factors must satisfy 1 <= n_factors < n_features ({}), got {}",
                n_features, n_factors
            )));
        }
        if n_samples < 2 {
            return Err(FactorError::shape(format!(
                "extraction needs at least 2 samples, got {}",
                n_samples
            )));
        }
        check_tolerance("tol", cfg.tol)?;
        if let Some(floor) = cfg.uniqueness_floor {
            if !(floor.is_finite() && floor >= 0.0) {
                return Err(FactorError::invalid("uniqueness_floor", floor, "finite and >= 0"));
            }
        }

        info!(
            "Extracting {} factors from {} samples x {} features (max_iter={}, tol={:e}).",
            n_factors, n_samples, n_features, cfg.max_iter, cfg.tol
        );

        let cov = covariance(data, cfg.ddof)?;
        let cov_diag = diag(&cov);
        let (mut loadings, mut psi) = self.initial_state(n_features, n_factors)?;
        let eye_k = Array2::<f64>::eye(n_factors);

        let mut converged = false;
        let mut iterations = 0;
        for iter in 0..cfg.max_iter {
            let factor_cov = loadings.dot(&loadings.t()) + undiag(&psi);
            let factor_cov_inv = inverse(&factor_cov, "factor covariance")?;

            // Regression weights of the factors on the observations.
            let beta = loadings.t().dot(&factor_cov_inv);
            let beta_s = beta.dot(&cov);
            let second_moment = &eye_k - &beta.dot(&loadings) + &beta_s.dot(&beta.t());
            let second_moment_inv = inverse(&second_moment, "factor second-moment matrix")?;

            let loadings_new = cov.dot(&beta.t()).dot(&second_moment_inv);
            let explained = (&loadings_new * &beta_s.t()).sum_axis(Axis(1));
            let mut psi_new = &cov_diag - &explained;
            if let Some(floor) = cfg.uniqueness_floor {
                psi_new.mapv_inplace(|v| v.max(floor));
            }
            ensure_finite(&loadings_new, "loadings update")?;
            ensure_finite(&psi_new, "uniqueness update")?;

            let loadings_delta = max_abs_diff(&loadings_new, &loadings);
            let psi_delta = max_abs_diff(&psi_new, &psi);
            trace!(
                "EM iteration {}: max |dLambda| = {:e}, max |dPsi| = {:e}",
                iter + 1,
                loadings_delta,
                psi_delta
            );

            loadings = loadings_new;
            psi = psi_new;
            iterations = iter + 1;

            if loadings_delta < cfg.tol && psi_delta < cfg.tol {
                converged = true;
                break;
            }
        }

        if converged {
            info!("Extraction converged after {} iterations.", iterations);
        } else {
            warn!(
                "Extraction did not converge within {} iterations (tol={:e}).",
                cfg.max_iter, cfg.tol
            );
        }
        let non_positive = psi.iter().filter(|&&v| v <= 0.0).count();
        if non_positive > 0 {
            warn!(
                "{} of {} uniquenesses are non-positive (Heywood case); consider a uniqueness_floor.",
                non_positive, n_features
            );
        }

        let communality = loadings.mapv(|v| v * v).sum_axis(Axis(1));
        Ok(ExtractionOutput {
            loadings,
            uniquenesses: psi,
            communality,
            converged,
            iterations,
        })
    }

    /// Starting `(Λ, ψ)`: caller-supplied values where given, otherwise uniform
    /// draws on [0, 1) from a ChaCha8 stream.
    fn initial_state(&self, n_features: usize, n_factors: usize) -> Result<(Array2<f64>, Array1<f64>)> {
        let cfg = &self.config;
        let mut rng = match cfg.seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        let unit = Uniform::new(0.0, 1.0);

        let loadings = match &cfg.initial_loadings {
            Some(given) => {
                if given.dim() != (n_features, n_factors) {
                    return Err(FactorError::shape(format!(
                        "initial loadings have shape {:?}, expected ({}, {})",
                        given.dim(),
                        n_features,
                        n_factors
                    )));
                }
                ensure_finite(given, "initial loadings")?;
                given.clone()
            }
            None => Array2::from_shape_fn((n_features, n_factors), |_| rng.sample(unit)),
        };
        let psi = match &cfg.initial_uniquenesses {
            Some(given) => {
                if given.len() != n_features {
                    return Err(FactorError::shape(format!(
                        "initial uniquenesses have length {}, expected {}",
                        given.len(),
                        n_features
                    )));
                }
                ensure_finite(given, "initial uniquenesses")?;
                given.clone()
            }
            None => Array1::from_shape_fn(n_features, |_| rng.sample(unit)),
        };
        debug!(
            "Initial state: seed={:?}, caller-supplied loadings={}, caller-supplied uniquenesses={}",
            cfg.seed,
            cfg.initial_loadings.is_some(),
            cfg.initial_uniquenesses.is_some()
        );
        Ok((loadings, psi))
    }
}
