use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lattice_stats::lattice_fit::{joint_cov, ExecutionStrategy};
use lattice_stats::prelude::*;
use nalgebra::DMatrix;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::Normal;

/// Generate a noisy single-exponential ensemble
fn generate_ensemble(samples: usize, timeslices: usize, seed: u64) -> DMatrix<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 0.01).unwrap();
    DMatrix::from_fn(samples, timeslices, |_, t| {
        (-0.3 * t as f64).exp() * (1.0 + normal.sample(&mut rng))
    })
}

fn bench_resampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample");
    for &samples in &[50, 200, 1000] {
        let raw = generate_ensemble(samples, 64, 42);
        let jackknife = Analysis::new().with_resampler(ResamplerSpec::Jackknife);
        group.bench_with_input(BenchmarkId::new("jackknife", samples), &raw, |b, raw| {
            b.iter(|| jackknife.build_correlator(black_box(raw), &[]).unwrap())
        });

        let bootstrap = Analysis::new().with_resampler(ResamplerSpec::Bootstrap {
            seed: 1,
            resamples: 500,
        });
        group.bench_with_input(BenchmarkId::new("bootstrap", samples), &raw, |b, raw| {
            b.iter(|| bootstrap.build_correlator(black_box(raw), &[]).unwrap())
        });
    }
    group.finish();
}

fn bench_joint_covariance(c: &mut Criterion) {
    let mut group = c.benchmark_group("joint_cov");
    let analysis = Analysis::new().with_resampler(ResamplerSpec::Jackknife);
    let a = analysis.build_correlator(&generate_ensemble(100, 64, 1), &[]).unwrap();
    let b = analysis.build_correlator(&generate_ensemble(100, 64, 2), &[]).unwrap();
    let windows = vec![(10..30).collect::<Vec<_>>(), (12..28).collect::<Vec<_>>()];

    for frozen in [true, false] {
        group.bench_function(BenchmarkId::new("two_correlators", if frozen { "frozen" } else { "unfrozen" }), |bench| {
            bench.iter(|| joint_cov(&[&a, &b], black_box(&windows), CorrelationPolicy::Full, frozen).unwrap())
        });
    }
    group.finish();
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit");
    group.sample_size(20);
    let analysis = Analysis::new().with_resampler(ResamplerSpec::Jackknife);
    let registry = FunctionRegistry::with_builtins();

    for &samples in &[50, 200] {
        let corr = analysis.build_correlator(&generate_ensemble(samples, 64, 7), &[]).unwrap();
        for (label, execution) in [
            ("sequential", ExecutionStrategy::Sequential),
            ("auto", ExecutionStrategy::Auto),
        ] {
            let spec = FitSpec::new()
                .add(&corr, registry.get("exp_2pt").unwrap().clone(), (10, 30))
                .free("Zsq", 0.5)
                .free("E", 0.25)
                .with_options(FitOptions::default().with_execution(execution));
            group.bench_with_input(BenchmarkId::new(label, samples), &spec, |b, spec| {
                b.iter(|| Fitter::default().fit(black_box(spec)).unwrap())
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_resampling, bench_joint_covariance, bench_fit);
criterion_main!(benches);
