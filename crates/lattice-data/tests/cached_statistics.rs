//! Cached statistics of correlators built through an analysis session

use approx::assert_relative_eq;
use lattice_core::{BinaryOp, Error, UnaryOp};
use lattice_data::{Analysis, BuiltinTransform, Statistic, Transform};
use lattice_resample::ResamplerSpec;
use nalgebra::DMatrix;
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

fn noisy_exponential(samples: usize, timeslices: usize, seed: u64) -> DMatrix<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.01).unwrap();
    DMatrix::from_fn(samples, timeslices, |_, t| {
        (-0.2 * t as f64).exp() * (1.0 + noise.sample(&mut rng))
    })
}

#[test]
fn forget_stats_after_mutation_recomputes_everything() {
    let analysis = Analysis::new().with_resampler(ResamplerSpec::Jackknife);
    let mut corr = analysis.build_correlator(&noisy_exponential(20, 8, 1), &[]).unwrap();

    let mean = corr.mean().unwrap();
    let cov = corr.cov().unwrap();
    let doubles = corr.cov_double().unwrap();

    corr.apply_assign(UnaryOp::Exp);
    assert!(Statistic::ALL.iter().all(|&s| !corr.is_cached(s)));

    assert!((corr.mean().unwrap()[3] - mean[3]).abs() > 1e-6);
    assert!((corr.cov().unwrap()[(0, 0)] - cov[(0, 0)]).abs() > 1e-12);
    assert!((corr.cov_double().unwrap()[0][(1, 1)] - doubles[0][(1, 1)]).abs() > 1e-12);
}

#[test]
fn jackknife_error_is_standard_error_of_the_mean() {
    let raw = noisy_exponential(50, 4, 7);
    let analysis = Analysis::new().with_resampler(ResamplerSpec::Jackknife);
    let corr = analysis.build_correlator(&raw, &[]).unwrap();
    let std = corr.std().unwrap();

    for t in 0..4 {
        let column = raw.column(t);
        let mean = column.mean();
        let s2 = column.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / 49.0;
        assert_relative_eq!(std[t], (s2 / 50.0).sqrt(), max_relative = 1e-10);
    }
}

#[test]
fn bootstrap_session_shares_draws_and_locks_sample_count() {
    let mut analysis =
        Analysis::new().with_resampler(ResamplerSpec::Bootstrap { seed: 3, resamples: 64 });
    let a = analysis.build_correlator(&noisy_exponential(30, 5, 1), &[]).unwrap();
    let b = analysis.build_correlator(&noisy_exponential(30, 5, 2), &[]).unwrap();
    assert_eq!(a.replicas(), 64);
    assert_eq!(b.replicas(), 64);
    assert_eq!(a.mean().unwrap().as_ref(), a.data_mean());

    assert!(matches!(
        analysis.build_correlator(&noisy_exponential(20, 5, 1), &[]),
        Err(Error::ConfigurationMismatch { expected: 30, actual: 20, .. })
    ));

    analysis.configure_resampler(None, Some(16)).unwrap();
    let c = analysis.build_correlator(&noisy_exponential(20, 5, 1), &[]).unwrap();
    assert_eq!(c.replicas(), 16);
}

#[test]
fn transforms_fold_then_bin() {
    let analysis = Analysis::new().with_resampler(ResamplerSpec::Jackknife);
    let raw = noisy_exponential(12, 8, 4);
    let fold = BuiltinTransform::fold();
    let bin = BuiltinTransform::from_name("bin_configurations", &[3.0]).unwrap();
    let steps: [&dyn Transform; 2] = [&fold, &bin];
    let configs = analysis.build_configurations(&raw, &steps).unwrap();

    assert_eq!(configs.shape(), (4, 8));
    assert_relative_eq!(configs.data()[(0, 1)], configs.data()[(0, 7)], epsilon = 1e-14);
}

#[test]
fn container_arithmetic_matches_expression() {
    let mut analysis = Analysis::new().with_resampler(ResamplerSpec::Jackknife);
    let corr = analysis.build_correlator(&noisy_exponential(10, 6, 9), &[]).unwrap();
    let explicit = corr.combine_scalar(BinaryOp::Mul, 2.0).combine(BinaryOp::Sub, &corr).unwrap();
    analysis.insert_correlator("c", corr);
    let parsed = analysis.combine_correlators("2 * {c} - {c}").unwrap();

    assert_relative_eq!(explicit.submean(), parsed.submean(), epsilon = 1e-14);
}

proptest! {
    #[test]
    fn scaling_scales_std(scale in 0.1f64..10.0) {
        let analysis = Analysis::new().with_resampler(ResamplerSpec::Jackknife);
        let corr = analysis.build_correlator(&noisy_exponential(15, 3, 5), &[]).unwrap();
        let scaled = corr.combine_scalar(BinaryOp::Mul, scale);
        let (s0, s1) = (corr.std().unwrap(), scaled.std().unwrap());
        for t in 0..3 {
            prop_assert!((s1[t] - scale * s0[t]).abs() <= 1e-9 * s1[t].max(1e-300));
        }
    }
}
