//! Resamplers for ensemble data
//!
//! This crate provides the two resampling schemes used to propagate
//! statistical uncertainty through an analysis:
//!
//! - **Jackknife**: deterministic leave-one-out replicas; central value is the
//!   replica mean; covariance scaled by `(N-1)/N`; supports double-replica
//!   ensembles for unfrozen (per-replica) covariances
//! - **Bootstrap**: seeded draws with replacement; central value is the raw
//!   point estimate; covariance scaled by `1/N_replicas`
//!
//! # Example
//!
//! ```rust
//! use lattice_core::Resampler;
//! use lattice_resample::ResamplerSpec;
//! use nalgebra::DMatrix;
//!
//! let resampler = ResamplerSpec::Jackknife.build();
//! let raw = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 2.0, 3.0, 3.0, 4.0]);
//! let replicas = resampler.resample(&raw).unwrap();
//! assert_eq!(replicas.shape(), (3, 2));
//! ```

mod bootstrap;
mod jackknife;
mod spec;

pub use bootstrap::{Bootstrap, IndexTable};
pub use jackknife::Jackknife;
pub use spec::{ResamplerSpec, DEFAULT_RESAMPLES};
