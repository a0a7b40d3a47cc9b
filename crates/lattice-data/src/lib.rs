//! Data containers for resampled ensemble analysis
//!
//! - [`Configurations`]: raw samples × variables measurements
//! - [`Correlator`]: point estimate + replica ensemble with cached statistics
//! - [`transforms`]: array transforms applied before wrapping raw data
//! - [`expression`]: closed arithmetic grammar for combining named data
//! - [`Analysis`]: session owning the shared resampler and named databases
//!
//! # Example
//!
//! ```rust
//! use lattice_data::{Analysis, Combined};
//! use lattice_resample::ResamplerSpec;
//! use nalgebra::DMatrix;
//!
//! let mut analysis = Analysis::new().with_resampler(ResamplerSpec::Jackknife);
//! let raw = DMatrix::from_fn(10, 8, |r, t| (1.0 + 0.01 * r as f64) * (-0.3 * t as f64).exp());
//! let corr = analysis.build_correlator(&raw, &[]).unwrap();
//! analysis.insert_correlator("pion", corr);
//!
//! let Combined::Correlator(meff) = analysis.combine("log({pion} / roll({pion}, -1))").unwrap() else {
//!     panic!("expected a correlator");
//! };
//! assert!((meff.mean().unwrap()[2] - 0.3).abs() < 1e-12);
//! ```

pub mod analysis;
pub mod configurations;
pub mod correlator;
pub mod expression;
pub mod import;
pub mod transforms;

pub use analysis::{Analysis, Combined, CorrelatorLookup};
pub use configurations::Configurations;
pub use correlator::{Correlator, Statistic};
pub use expression::{Bindings, Expression};
pub use import::DataImporter;
pub use transforms::{apply_transforms, Axis, BuiltinTransform, Transform};
