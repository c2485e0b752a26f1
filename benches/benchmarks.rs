use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use efficient_fa::{ExtractionConfig, FactorExtractor, PromaxConfig, Rotator, VarimaxConfig};
use ndarray::{Array, Array2};
use ndarray_rand::rand_distr::{Normal, Uniform};
use ndarray_rand::RandomExt;

// Data from a k-factor model with loadings drawn on [0.3, 0.9).
fn generate_factor_data(n_samples: usize, n_features: usize, n_factors: usize) -> Array2<f64> {
    let loadings = Array::random((n_features, n_factors), Uniform::new(0.3, 0.9));
    let factors = Array::random((n_samples, n_factors), Normal::new(0.0, 1.0).unwrap());
    let noise = Array::random((n_samples, n_features), Normal::new(0.0, 0.5).unwrap());
    factors.dot(&loadings.t()) + noise
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("FactorExtractor_extract");

    for &(n_samples, n_features, n_factors) in [(500, 10, 2), (2000, 30, 4), (5000, 60, 6)].iter() {
        let data = generate_factor_data(n_samples, n_features, n_factors);
        let extractor = FactorExtractor::new(ExtractionConfig::default().with_seed(42));
        group.throughput(Throughput::Elements((n_samples * n_features) as u64));
        group.bench_with_input(
            BenchmarkId::new("extract", format!("{}x{}k{}", n_samples, n_features, n_factors)),
            &data,
            |b, data_matrix| {
                b.iter(|| extractor.extract(data_matrix.view(), n_factors).unwrap());
            },
        );
    }
    group.finish();
}

fn bench_rotations(c: &mut Criterion) {
    let mut group = c.benchmark_group("Rotator");
    let rotator = Rotator::new();

    for &(n_features, n_factors) in [(20, 3), (100, 8), (400, 15)].iter() {
        let loadings = Array::random((n_features, n_factors), Uniform::new(-0.9, 0.9));
        let label = format!("{}x{}", n_features, n_factors);

        group.bench_with_input(BenchmarkId::new("varimax", &label), &loadings, |b, phi| {
            b.iter(|| rotator.varimax(phi.view(), &VarimaxConfig::default()).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("quartimax", &label), &loadings, |b, phi| {
            b.iter(|| rotator.varimax(phi.view(), &VarimaxConfig::quartimax()).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("promax", &label), &loadings, |b, phi| {
            b.iter(|| rotator.promax(phi.view(), &PromaxConfig::default()).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_extract, bench_rotations);
criterion_main!(benches);
