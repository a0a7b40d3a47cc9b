//! Statistical properties of the resamplers

use approx::assert_relative_eq;
use lattice_core::matrix::column_means;
use lattice_core::{Error, Resampler};
use lattice_resample::{Bootstrap, Jackknife, ResamplerSpec};
use nalgebra::DMatrix;
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

fn gaussian_ensemble(samples: usize, vars: usize, seed: u64) -> DMatrix<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let normal = Normal::new(1.0, 0.2).unwrap();
    DMatrix::from_fn(samples, vars, |_, _| normal.sample(&mut rng))
}

fn sample_variance(column: &[f64]) -> f64 {
    let n = column.len() as f64;
    let mean = column.iter().sum::<f64>() / n;
    column.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)
}

#[test]
fn jackknife_variance_is_standard_error_squared() {
    let raw = gaussian_ensemble(40, 3, 11);
    let jk = Jackknife::new();
    let replicas = jk.resample(&raw).unwrap();
    let central = jk.mean_definition(&column_means(&raw), &column_means(&replicas));
    let (_, var, std) = jk.cov_var_std(&central, &replicas);

    for j in 0..3 {
        let column: Vec<f64> = raw.column(j).iter().copied().collect();
        let expected = sample_variance(&column) / 40.0;
        assert_relative_eq!(var[j], expected, max_relative = 1e-10);
        assert_relative_eq!(std[j], expected.sqrt(), max_relative = 1e-10);
    }
}

#[test]
fn jackknife_error_shrinks_with_more_samples() {
    let jk = Jackknife::new();
    let std_for = |n: usize| {
        let raw = gaussian_ensemble(n, 1, 5);
        let replicas = jk.resample(&raw).unwrap();
        let central = column_means(&replicas);
        jk.cov_var_std(&central, &replicas).2[0]
    };
    assert!(std_for(400) < std_for(25));
}

#[test]
fn bootstrap_is_reproducible_from_seed() {
    let raw = gaussian_ensemble(30, 4, 2);
    let first = Bootstrap::new(99, 50).resample(&raw).unwrap();
    let second = Bootstrap::new(99, 50).resample(&raw).unwrap();
    assert_eq!(first, second);

    let other = Bootstrap::new(100, 50).resample(&raw).unwrap();
    assert_ne!(first, other);
}

#[test]
fn bootstrap_shares_draws_across_ensembles() {
    let boot = Bootstrap::new(4, 20);
    let a = gaussian_ensemble(25, 2, 1);
    let b = &a * 2.0;
    let ra = boot.resample(&a).unwrap();
    let rb = boot.resample(&b).unwrap();
    assert_relative_eq!(rb, ra * 2.0, epsilon = 1e-12);
}

#[test]
fn bootstrap_rejects_other_sample_counts_until_reconfigured() {
    let boot = Bootstrap::new(4, 20);
    boot.resample(&gaussian_ensemble(25, 2, 1)).unwrap();
    assert!(matches!(
        boot.resample(&gaussian_ensemble(24, 2, 1)),
        Err(Error::ConfigurationMismatch { expected: 25, actual: 24, .. })
    ));

    boot.configure(Some(4), None).unwrap();
    assert!(boot.resample(&gaussian_ensemble(24, 2, 1)).is_ok());
}

#[test]
fn bootstrap_error_is_close_to_standard_error() {
    let raw = gaussian_ensemble(100, 1, 8);
    let boot = Bootstrap::new(17, 2000);
    let replicas = boot.resample(&raw).unwrap();
    let central = boot.mean_definition(&column_means(&raw), &column_means(&replicas));
    let (_, var, _) = boot.cov_var_std(&central, &replicas);

    let column: Vec<f64> = raw.column(0).iter().copied().collect();
    let expected = sample_variance(&column) / 100.0;
    assert_relative_eq!(var[0], expected, max_relative = 0.2);
}

#[test]
fn spec_builds_shared_resampler() {
    let spec: ResamplerSpec = serde_json::from_str(r#"{"kind":"jackknife"}"#).unwrap();
    let resampler = spec.build();
    assert_eq!(resampler.replica_count(12), 12);
}

proptest! {
    #[test]
    fn jackknife_covariance_is_symmetric_psd_diagonal(
        values in prop::collection::vec(-10.0f64..10.0, 12..60)
    ) {
        let n = values.len() / 2;
        let raw = DMatrix::from_row_slice(n, 2, &values[..2 * n]);
        let jk = Jackknife::new();
        let replicas = jk.resample(&raw).unwrap();
        let cov = jk.cov_definition(&column_means(&replicas), &replicas);

        prop_assert!((cov[(0, 1)] - cov[(1, 0)]).abs() < 1e-9);
        prop_assert!(cov[(0, 0)] >= 0.0);
        prop_assert!(cov[(1, 1)] >= 0.0);
        prop_assert!(cov[(0, 1)].powi(2) <= cov[(0, 0)] * cov[(1, 1)] + 1e-9);
    }

    #[test]
    fn jackknife_double_ensemble_means_recover_replicas(
        values in prop::collection::vec(-5.0f64..5.0, 4..20)
    ) {
        let raw = DMatrix::from_column_slice(values.len(), 1, &values);
        let jk = Jackknife::new();
        let replicas = jk.resample(&raw).unwrap();
        let doubles = jk.submean_double_definition(&replicas).unwrap();
        for (i, sub) in doubles.iter().enumerate() {
            let mean = column_means(sub);
            prop_assert!((mean[0] - replicas[(i, 0)]).abs() < 1e-9);
        }
    }
}
