//! # lattice-stats
//!
//! Resampling and correlated joint fits for ensemble time-series data, such
//! as two-point correlators measured on lattice gauge configurations.
//!
//! The workspace is split into focused crates, re-exported here:
//!
//! - [`lattice_core`]: error taxonomy, the `Resampler` trait, statistic memo tables
//! - [`lattice_resample`]: jackknife and bootstrap resamplers
//! - [`lattice_data`]: `Configurations`, `Correlator`, transforms, combination expressions, the `Analysis` session
//! - [`lattice_fit`]: joint covariance, parameter resolution, the fit driver and window scans
//!
//! ## Quick start
//!
//! ```rust
//! use lattice_stats::prelude::*;
//! use nalgebra::DMatrix;
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//! use rand_distr::{Distribution, Normal};
//!
//! let mut analysis = Analysis::new().with_resampler(ResamplerSpec::Jackknife);
//! let mut rng = ChaCha8Rng::seed_from_u64(7);
//! let noise = Normal::new(0.0, 0.004).unwrap();
//! let raw = DMatrix::from_fn(24, 16, |_, t| {
//!     0.2 / 0.5 * (-0.25 * t as f64).exp() * (1.0 + noise.sample(&mut rng))
//! });
//! let corr = analysis.build_correlator(&raw, &[]).unwrap();
//! analysis.insert_correlator("pion", corr);
//!
//! let pion = analysis.correlator("pion").unwrap();
//! let registry = FunctionRegistry::with_builtins();
//! let spec = FitSpec::new()
//!     .add(pion, registry.get("exp_2pt").unwrap().clone(), (3, 11))
//!     .free("Zsq", 0.1)
//!     .free("E", 0.3);
//! let result = Fitter::default().fit(&spec).unwrap();
//! assert_eq!(result.dof, 7);
//! ```

pub use lattice_core;
pub use lattice_data;
pub use lattice_fit;
pub use lattice_resample;

pub use lattice_core::{Error, Result};

/// Commonly used types
pub mod prelude {
    pub use lattice_core::{BinaryOp, Error, Resampler, ResamplerKind, Result, UnaryOp};
    pub use lattice_data::{Analysis, BuiltinTransform, Combined, Configurations, Correlator, Statistic};
    pub use lattice_fit::{
        CorrelationPolicy, FitOptions, FitResult, FitSpec, FitWindow, Fitter, FunctionRegistry,
        LevenbergMarquardt, WindowScan,
    };
    pub use lattice_resample::{Bootstrap, Jackknife, ResamplerSpec};
}
