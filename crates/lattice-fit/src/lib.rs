//! Correlated joint fits over resampled correlators
//!
//! Several correlators can be fitted at once, each by its own model function
//! over its own window, with parameters shared by name across functions.
//!
//! - [`covariance`]: joint covariance across correlators, correlation policy, whitening weights
//! - [`params`]: argument identity resolution (free, constant, automatic, data series)
//! - [`functions`]: model functions and the two-point library
//! - [`minimiser`]: the [`Minimiser`] trait and Levenberg–Marquardt
//! - [`fit`]: the [`Fitter`] driver, central fit then one fit per replica
//! - [`window`]: fit windows and window scans
//!
//! # Example
//!
//! ```rust
//! use lattice_fit::{FitSpec, Fitter, FunctionRegistry};
//! use lattice_data::Analysis;
//! use lattice_resample::ResamplerSpec;
//! use nalgebra::DMatrix;
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//! use rand_distr::{Distribution, Normal};
//!
//! let analysis = Analysis::new().with_resampler(ResamplerSpec::Jackknife);
//! let mut rng = ChaCha8Rng::seed_from_u64(1);
//! let noise = Normal::new(0.0, 0.005).unwrap();
//! let raw = DMatrix::from_fn(20, 16, |_, t| {
//!     0.4 * (-0.25 * t as f64).exp() * (1.0 + noise.sample(&mut rng))
//! });
//! let corr = analysis.build_correlator(&raw, &[]).unwrap();
//!
//! let registry = FunctionRegistry::with_builtins();
//! let spec = FitSpec::new()
//!     .add(&corr, registry.get("exp_2pt").unwrap().clone(), (4, 12))
//!     .free("Zsq", 0.1)
//!     .free("E", 0.3);
//! let result = Fitter::default().fit(&spec).unwrap();
//!
//! let (energy, _error) = result.parameter("E").unwrap();
//! assert!((energy - 0.25).abs() < 0.01);
//! assert_eq!(result.dof, 7);
//! ```

pub mod covariance;
pub mod execution;
pub mod fit;
pub mod functions;
pub mod goodness;
pub mod minimiser;
pub mod params;
pub mod result;
pub mod scan;
pub mod window;

pub use covariance::{
    cov_to_weights, cut_down_and_correlate, joint_cov, CorrelationPolicy, CovarianceOverride,
    JointCovariance, JointWeights, ReplicaFailure,
};
pub use execution::ExecutionStrategy;
pub use fit::{FitOptions, FitSpec, Fitter};
pub use functions::{two_point, ArgValue, Arity, FitFunction, FunctionRegistry};
pub use goodness::{goodness_of_fit, p_value, GoodnessOfFit};
pub use minimiser::{LevenbergMarquardt, Minimiser, Minimum, ResidualFn};
pub use params::{resolve, ParameterResolution, ParameterTemplate, ResolutionRequest, Slot};
pub use result::{FitResult, FitSummary, ParameterSummary, SubFitResult};
pub use scan::{ScanFailure, ScanResult};
pub use window::{combination_key, FitWindow, ScanAxis, WindowScan};
