//! Core traits and types for resampled ensemble analysis
//!
//! This crate provides the pieces every other lattice-stats crate builds on:
//!
//! - [`Error`] / [`Result`]: the shared error taxonomy
//! - [`Resampler`]: the resampling policy trait (jackknife, bootstrap, ...)
//! - [`StatCache`]: the memoization table behind lazily derived statistics
//! - [`ops`]: explicit element-wise arithmetic shared by all data containers
//! - [`matrix`]: small helpers over `nalgebra` dense matrices
//!
//! # Data layout
//!
//! All ensembles are `nalgebra::DMatrix<f64>` with rows indexing samples (or
//! replicas) and columns indexing the variable axis, e.g. time slices.

pub mod cache;
pub mod error;
pub mod matrix;
pub mod ops;
pub mod traits;

pub use cache::StatCache;
pub use error::{Error, Result};
pub use ops::{BinaryOp, UnaryOp};
pub use traits::{Resampler, ResamplerKind};

pub use nalgebra::{DMatrix, DVector};
