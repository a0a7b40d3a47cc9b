//! Shared utilities for integration tests

#![allow(dead_code)]

pub use approx::assert_relative_eq;

use nalgebra::DMatrix;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

pub const TIMESLICES: usize = 64;
pub const SAMPLES: usize = 50;

/// Ground and excited state of the synthetic signal, as (amplitude, energy)
pub const GROUND: (f64, f64) = (1.0, 0.3);
pub const EXCITED: (f64, f64) = (1.0, 1.0);

/// Noise-free two-exponential signal at time `t`
pub fn signal(t: f64) -> f64 {
    GROUND.0 * (-GROUND.1 * t).exp() + EXCITED.0 * (-EXCITED.1 * t).exp()
}

/// Samples × timeslices of the two-exponential signal with relative Gaussian noise
pub fn two_exponential(samples: usize, timeslices: usize, relative_noise: f64, seed: u64) -> DMatrix<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let noise = Normal::new(0.0, relative_noise).unwrap();
    DMatrix::from_fn(samples, timeslices, |_, t| {
        signal(t as f64) * (1.0 + noise.sample(&mut rng))
    })
}

/// The standard ensemble: 64 timeslices, 50 samples, 1% noise
pub fn standard_ensemble(seed: u64) -> DMatrix<f64> {
    two_exponential(SAMPLES, TIMESLICES, 0.01, seed)
}

/// Route `tracing` output through the test harness; set `RUST_LOG` to see it
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
