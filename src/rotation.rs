// src/rotation.rs

//! Orthogonal (Varimax/Quartimax) and oblique (Promax) rotation of loading matrices.
//!
//! Both solvers return a k × k matrix that the caller multiplies onto the loadings;
//! [`RotationOutput::apply`] does that multiplication for convenience.

use crate::error::{check_tolerance, FactorError, Result};
use crate::matrix_ops::{ensure_finite, max_abs_diff, svd};
use log::{debug, info, trace, warn};
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Parameters of the orthomax family solved by [`Rotator::varimax`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarimaxConfig {
    /// Orthomax weight: `1.0` is Varimax, `0.0` is Quartimax.
    pub gamma: f64,
    /// Hard upper bound on SVD iterations.
    pub max_itr: usize,
    /// Stop once the criterion grows by a relative factor below `1 + tol`.
    pub tol: f64,
}

impl Default for VarimaxConfig {
    fn default() -> Self {
        VarimaxConfig {
            gamma: 1.0,
            max_itr: 1000,
            tol: 1e-6,
        }
    }
}

impl VarimaxConfig {
    /// Quartimax: the `gamma = 0` member of the family.
    pub fn quartimax() -> Self {
        VarimaxConfig {
            gamma: 0.0,
            ..Default::default()
        }
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_max_itr(mut self, max_itr: usize) -> Self {
        self.max_itr = max_itr;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }
}

/// Parameters of [`Rotator::promax`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromaxConfig {
    /// Power applied to the Varimax loadings to build the target.
    pub kappa: f64,
    /// Hard upper bound on target-fitting iterations.
    pub max_iter: usize,
    /// Stop once no entry of the transform moves by `tol` or more.
    pub tol: f64,
    /// Settings of the preliminary Varimax rotation.
    pub varimax: VarimaxConfig,
}

impl Default for PromaxConfig {
    fn default() -> Self {
        PromaxConfig {
            kappa: 4.0,
            max_iter: 1000,
            tol: 1e-6,
            varimax: VarimaxConfig::default(),
        }
    }
}

impl PromaxConfig {
    pub fn with_kappa(mut self, kappa: f64) -> Self {
        self.kappa = kappa;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }
}

/// A rotation (Varimax) or transformation (Promax) matrix plus convergence info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationOutput {
    /// Shape: (n_factors, n_factors)
    pub matrix: Array2<f64>,
    /// `false` if the iteration budget ran out before the stopping rule fired.
    pub converged: bool,
    pub iterations: usize,
}

impl RotationOutput {
    /// Multiplies `loadings` (n_features × n_factors) by the rotation/transform.
    pub fn apply(&self, loadings: ArrayView2<f64>) -> Result<Array2<f64>> {
        if loadings.ncols() != self.matrix.nrows() {
            return Err(FactorError::shape(format!(
                "loadings have {} columns but the rotation is {:?}",
                loadings.ncols(),
                self.matrix.dim()
            )));
        }
        Ok(loadings.dot(&self.matrix))
    }
}

/// Loading-matrix rotator. Stateless; parameters travel in the per-call configs.
#[derive(Debug, Default, Clone, Copy)]
pub struct Rotator;

impl Rotator {
    pub fn new() -> Self {
        Rotator
    }

    /// Orthomax rotation of `phi` (p × k, p >= k) by iterated polar decomposition.
    ///
    /// Each step forms `M = Φᵀ·(Λ³ − (γ/p)·Λ·diag(diag(ΛᵀΛ)))` with `Λ = Φ·R` and
    /// replaces `R` by the orthogonal polar factor `U·Vᵀ` of `M`. The sum of the
    /// singular values of `M` is the criterion `d`; iteration stops when
    /// `d_new / d < 1 + tol`. The returned matrix is orthonormal to working
    /// precision whether or not the loop converged.
    ///
    /// # Errors
    /// `Shape` unless `p >= k >= 1`, `InvalidParameter` for a non-finite `gamma`
    /// or bad `tol`, `NumericalInstability` for non-finite input or SVD failure.
    pub fn varimax(&self, phi: ArrayView2<f64>, config: &VarimaxConfig) -> Result<RotationOutput> {
        let (p, k) = phi.dim();
        check_loadings_shape(p, k)?;
        ensure_finite(&phi, "rotation input")?;
        if !config.gamma.is_finite() {
            return Err(FactorError::invalid("gamma", config.gamma, "finite"));
        }
        check_tolerance("tol", config.tol)?;
        debug!(
            "Orthomax rotation of {}x{} loadings (gamma={}, max_itr={}, tol={:e}).",
            p, k, config.gamma, config.max_itr, config.tol
        );

        let weight = config.gamma / p as f64;
        let mut rotation = Array2::<f64>::eye(k);
        let mut criterion = 0.0_f64;
        let mut converged = false;
        let mut iterations = 0;

        for itr in 0..config.max_itr {
            let lambda = phi.dot(&rotation);
            let column_ss = lambda.mapv(|v| v * v).sum_axis(Axis(0));
            let mut gradient = lambda.mapv(|v| v.powi(3));
            gradient.scaled_add(-weight, &(&lambda * &column_ss));

            let parts = svd(&phi.t().dot(&gradient))?;
            rotation = parts.u.dot(&parts.vt);
            let criterion_new = parts.s.sum();
            iterations = itr + 1;
            trace!("Orthomax iteration {}: criterion = {:e}", iterations, criterion_new);

            if criterion != 0.0 && criterion_new / criterion < 1.0 + config.tol {
                converged = true;
                break;
            }
            criterion = criterion_new;
        }

        if converged {
            info!("Orthomax rotation converged after {} iterations.", iterations);
        } else {
            warn!(
                "Orthomax rotation did not converge within {} iterations.",
                config.max_itr
            );
        }
        Ok(RotationOutput {
            matrix: rotation,
            converged,
            iterations,
        })
    }

    /// Promax rotation of unrotated loadings `phi`.
    ///
    /// Rotates `phi` with Varimax first and then fits the signed power target
    /// with [`Rotator::promax_rotated`]. The returned transform applies to the
    /// Varimax-rotated loadings `Φ·R`, not to `phi` itself.
    pub fn promax(&self, phi: ArrayView2<f64>, config: &PromaxConfig) -> Result<RotationOutput> {
        check_kappa(config.kappa)?;
        let varimax = self.varimax(phi, &config.varimax)?;
        if !varimax.converged {
            warn!("Promax is starting from a Varimax solution that did not converge.");
        }
        let rotated = phi.dot(&varimax.matrix);
        self.promax_rotated(rotated.view(), config)
    }

    /// Promax target fitting on loadings that are already Varimax-rotated.
    ///
    /// Builds `P = sign(Λ)·|Λ|^kappa` and iterates, starting from `T = I`,
    /// `S = Pᵀ·Λ·T; T ← S·diag(1/diag(S))` until `max |T − T_prev| < tol`.
    ///
    /// # Errors
    /// `SingularMatrix` if a diagonal entry of `S` is zero relative to the
    /// largest entry of `S` (the target has no mass for that factor);
    /// `NumericalInstability` for non-finite values;
    /// `Shape`/`InvalidParameter` as for [`Rotator::varimax`].
    pub fn promax_rotated(&self, rotated: ArrayView2<f64>, config: &PromaxConfig) -> Result<RotationOutput> {
        let (p, k) = rotated.dim();
        check_loadings_shape(p, k)?;
        ensure_finite(&rotated, "promax input")?;
        check_kappa(config.kappa)?;
        check_tolerance("tol", config.tol)?;

        let kappa = config.kappa;
        // sign(0) = 0, so zero loadings stay out of the target even for kappa = 0.
        let target = rotated.mapv(|v| if v == 0.0 { 0.0 } else { v.signum() * v.abs().powf(kappa) });
        let mut transform = Array2::<f64>::eye(k);
        let mut converged = false;
        let mut iterations = 0;

        for iter in 0..config.max_iter {
            let pattern = rotated.dot(&transform);
            let structure = target.t().dot(&pattern);
            ensure_finite(&structure, "promax structure matrix")?;
            // The transform is invariant to the scale of the loadings, so the
            // degeneracy threshold is relative to the structure matrix itself.
            let scale = structure.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
            let structure_diag = structure.diag();
            if let Some(j) = structure_diag.iter().position(|v| v.abs() <= f64::EPSILON * scale) {
                return Err(FactorError::SingularMatrix {
                    matrix: "promax structure matrix",
                    detail: format!(
                        "diagonal entry {} is {:e}; the target is degenerate for that factor",
                        j, structure_diag[j]
                    ),
                });
            }
            let next = &structure * &structure_diag.mapv(|v| 1.0 / v);

            let delta = max_abs_diff(&next, &transform);
            transform = next;
            iterations = iter + 1;
            trace!("Promax iteration {}: max |dT| = {:e}", iterations, delta);
            if delta < config.tol {
                converged = true;
                break;
            }
        }

        if converged {
            info!("Promax converged after {} iterations.", iterations);
        } else {
            warn!("Promax did not converge within {} iterations.", config.max_iter);
        }
        Ok(RotationOutput {
            matrix: transform,
            converged,
            iterations,
        })
    }
}

fn check_loadings_shape(p: usize, k: usize) -> Result<()> {
    if k == 0 || p < k {
        return Err(FactorError::shape(format!(
            "loadings must be p x k with p >= k >= 1, got {} x {}",
            p, k
        )));
    }
    Ok(())
}

fn check_kappa(kappa: f64) -> Result<()> {
    if kappa.is_finite() && kappa >= 0.0 {
        Ok(())
    } else {
        Err(FactorError::invalid("kappa", kappa, "finite and >= 0"))
    }
}
