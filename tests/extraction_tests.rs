// In tests/extraction_tests.rs

use efficient_fa::matrix_ops::svd;
use efficient_fa::{extract, rotate_varimax, ExtractionConfig, FactorError, FactorExtractor};
use ndarray::{array, s, Array1, Array2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

const N_SAMPLES: usize = 5000;

fn true_loadings() -> Array2<f64> {
    array![
        [0.8, 0.1],
        [0.7, 0.0],
        [0.75, 0.2],
        [0.1, 0.8],
        [0.0, 0.7],
        [0.2, 0.65],
        [0.5, 0.5]
    ]
}

fn true_uniquenesses(loadings: &Array2<f64>) -> Array1<f64> {
    loadings.mapv(|v| v * v).sum_axis(ndarray::Axis(1)).mapv(|c| 1.0 - c)
}

// x = Λ z + ε with z ~ N(0, I) and ε ~ N(0, diag(ψ)), plus a per-feature offset
// so that centering is exercised.
fn simulate(loadings: &Array2<f64>, psi: &Array1<f64>, n: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let (p, k) = loadings.dim();
    let factors = Array2::from_shape_fn((n, k), |_| normal.sample(&mut rng));
    let noise = Array2::from_shape_fn((n, p), |(_, j)| psi[j].sqrt() * normal.sample(&mut rng));
    let offsets = Array1::from_shape_fn(p, |j| 3.0 * j as f64 - 4.0);
    factors.dot(&loadings.t()) + noise + &offsets
}

// Frobenius norm of Λ̂·Q − Λ₀ for the orthogonal Q that best aligns Λ̂ to Λ₀
// (orthogonal Procrustes: Q = U·Vᵀ from the SVD of Λ̂ᵀ·Λ₀).
fn procrustes_residual(estimated: &Array2<f64>, truth: &Array2<f64>) -> f64 {
    let parts = svd(&estimated.t().dot(truth)).unwrap();
    let q = parts.u.dot(&parts.vt);
    let residual = estimated.dot(&q) - truth;
    residual.mapv(|v| v * v).sum().sqrt()
}

#[test]
fn recovers_known_factor_model() {
    let loadings0 = true_loadings();
    let psi0 = true_uniquenesses(&loadings0);
    let data = simulate(&loadings0, &psi0, N_SAMPLES, 2024);

    let out = extract(data.view(), 2, 5000, 1e-7, Some(17)).unwrap();
    assert_eq!(out.loadings.dim(), (7, 2));
    assert_eq!(out.uniquenesses.len(), 7);

    let loadings_residual = procrustes_residual(&out.loadings, &loadings0);
    assert!(
        loadings_residual < 0.1,
        "loadings residual after alignment is {}",
        loadings_residual
    );
    let psi_residual = (&out.uniquenesses - &psi0).mapv(|v| v * v).sum().sqrt();
    assert!(psi_residual < 0.1, "uniqueness residual is {}", psi_residual);

    // Unit-variance features: communality + uniqueness ≈ 1.
    for i in 0..7 {
        let total = out.communality[i] + out.uniquenesses[i];
        assert!((total - 1.0).abs() < 0.1, "feature {} total variance {}", i, total);
    }
}

#[test]
fn extraction_then_varimax_restores_simple_structure() {
    let loadings0 = true_loadings().slice(s![..6, ..]).to_owned();
    let psi0 = true_uniquenesses(&loadings0);
    let data = simulate(&loadings0, &psi0, N_SAMPLES, 99);

    let out = extract(data.view(), 2, 5000, 1e-7, Some(5)).unwrap();
    let rotation = rotate_varimax(out.loadings.view(), 1.0, 1000, 1e-8).unwrap();
    let rotated = rotation.apply(out.loadings.view()).unwrap();

    // Features 0..3 and 3..6 should each load on a single, different factor.
    let dominant: Vec<usize> = rotated
        .rows()
        .into_iter()
        .map(|row| if row[0].abs() >= row[1].abs() { 0 } else { 1 })
        .collect();
    assert_eq!(dominant[0], dominant[1]);
    assert_eq!(dominant[1], dominant[2]);
    assert_eq!(dominant[3], dominant[4]);
    assert_eq!(dominant[4], dominant[5]);
    assert_ne!(dominant[0], dominant[3]);
}

#[test]
fn caller_supplied_start_is_deterministic() {
    let loadings0 = true_loadings();
    let psi0 = true_uniquenesses(&loadings0);
    let data = simulate(&loadings0, &psi0, 1000, 7);

    let start = Array2::from_elem((7, 2), 0.5);
    let start_psi = Array1::from_elem(7, 0.5);
    let config = ExtractionConfig::default()
        .with_initial_guess(start.clone(), start_psi.clone())
        .with_max_iter(50);
    let a = FactorExtractor::new(config.clone()).extract(data.view(), 2).unwrap();
    let b = FactorExtractor::new(config).extract(data.view(), 2).unwrap();
    assert_eq!(a.loadings, b.loadings);
    assert_eq!(a.uniquenesses, b.uniquenesses);
}

#[test]
fn zero_tolerance_reports_non_convergence() {
    let loadings0 = true_loadings();
    let psi0 = true_uniquenesses(&loadings0);
    let data = simulate(&loadings0, &psi0, 500, 31);

    let out = extract(data.view(), 2, 12, 0.0, Some(1)).unwrap();
    assert!(!out.converged);
    assert_eq!(out.iterations, 12);
    assert!(out.loadings.iter().all(|v| v.is_finite()));
}

#[test]
fn shape_errors_come_before_any_work() {
    let data = Array2::<f64>::zeros((1, 4));
    assert!(matches!(
        extract(data.view(), 1, 100, 1e-5, Some(0)),
        Err(FactorError::Shape { .. })
    ));
    let data = Array2::<f64>::zeros((10, 4));
    assert!(matches!(
        extract(data.view(), 4, 100, 1e-5, Some(0)),
        Err(FactorError::Shape { .. })
    ));
}

#[test]
fn nan_in_data_is_numerical_instability() {
    let mut data = Array2::<f64>::ones((10, 3));
    data[[4, 1]] = f64::NAN;
    assert!(matches!(
        extract(data.view(), 1, 100, 1e-5, Some(0)),
        Err(FactorError::NumericalInstability { .. })
    ));
}

#[test]
fn collinear_features_exhaust_budget_without_error() {
    let loadings0 = true_loadings().slice(s![..5, ..]).to_owned();
    let psi0 = true_uniquenesses(&loadings0);
    let mut data = simulate(&loadings0, &psi0, 400, 11);
    // Feature 3 becomes an exact linear combination, so the sample covariance is singular.
    let combined = &data.column(0) + &data.column(1);
    data.column_mut(3).assign(&combined);

    let out = extract(data.view(), 2, 25, 1e-14, Some(3)).unwrap();
    assert!(!out.converged);
    assert_eq!(out.iterations, 25);
    assert!(out.loadings.iter().all(|v| v.is_finite()));
    assert!(out.uniquenesses.iter().all(|v| v.is_finite()));
}
